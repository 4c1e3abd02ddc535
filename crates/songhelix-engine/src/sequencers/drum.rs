//! The drum engine: fixed-pitch voices with conditional rewrite rules.

use log::warn;
use rand::Rng;
use rand_pcg::Pcg32;

use songhelix_spec::sequencers::{ConditionalMode, ConditionalPatternSpec, DrumSpec};

use crate::activity::ActivityVector;
use crate::error::EngineError;
use crate::pattern::{Pattern, PatternEntry};
use crate::patterns::{build_pattern, parse_pattern, ParseOptions, PatternContext};
use crate::sequence::{Sequence, Track, TrackKind};

use super::condition::Condition;
use super::RenderContext;

/// `x` marks a hit in drum patterns; the pitch comes from the voice.
const DRUM_WILDCARDS: &[char] = &['x'];

/// One tick-addressed note cell of a drum voice buffer.
#[derive(Debug, Clone, Copy)]
struct Cell {
    velocity: i32,
    ticks: u32,
}

/// Render a drum track: one sequence per voice, then the conditional rules.
pub(super) fn render(
    spec: &DrumSpec,
    ctx: &RenderContext,
    _vectors: &[&ActivityVector],
    rng: &mut Pcg32,
) -> Result<Track, EngineError> {
    if spec.voices.is_empty() {
        return Err(EngineError::SequencerConfig {
            message: "drum engine needs at least one voice".to_string(),
        });
    }
    for (index, rule) in spec.conditional_patterns.iter().enumerate() {
        for &target in &rule.targets {
            if target >= spec.voices.len() {
                return Err(EngineError::UnknownDrumVoice {
                    rule: index,
                    index: target,
                    voices: spec.voices.len(),
                });
            }
        }
    }
    let pattern_ctx = PatternContext {
        wildcards: DRUM_WILDCARDS,
        max_velocity: ctx.structure.max_velocity,
    };
    let total = ctx.total_ticks();

    // Base render into tick-addressed buffers.
    let mut buffers: Vec<Vec<Option<Cell>>> = Vec::with_capacity(spec.voices.len());
    for voice in &spec.voices {
        let pattern = build_pattern(&voice.pattern, &pattern_ctx, rng)?
            .scale_to(ctx.structure.ticks_per_beat)?;
        let vector = ctx
            .activity_matrix
            .get(&voice.activity_vector)
            .ok_or_else(|| EngineError::UnknownActivityVector {
                name: voice.activity_vector.clone(),
            })?;
        buffers.push(render_voice(&pattern, vector, total));
    }

    apply_conditional_rules(spec, ctx, &mut buffers, rng)?;

    let mut track = Track::new(TrackKind::Rhythm);
    for (voice, buffer) in spec.voices.iter().zip(&buffers) {
        track
            .sequences
            .push(buffer_to_sequence(buffer, voice.pitch, ctx));
    }
    Ok(track)
}

/// Walk the pattern cyclically over the song, writing active hits.
fn render_voice(pattern: &Pattern, vector: &ActivityVector, total: usize) -> Vec<Option<Cell>> {
    let mut buffer = vec![None; total];
    let mut tick = 0usize;
    let mut entry_index = 0usize;
    while tick < total {
        let entry = pattern.entry_wrapped(entry_index);
        entry_index += 1;
        let ticks = (entry.ticks() as usize).min(total - tick);
        if let PatternEntry::Note { velocity, .. } = *entry {
            if vector.is_active(tick) {
                buffer[tick] = Some(Cell {
                    velocity,
                    ticks: ticks as u32,
                });
            }
        }
        tick += ticks;
    }
    buffer
}

/// Walk chord section boundaries applying the conditional rules.
///
/// Each rule keeps its own cursor over the boundaries; skip offsets move it
/// forward or backward. A rule that keeps re-applying is disabled once its
/// application count exceeds four times the section count.
fn apply_conditional_rules(
    spec: &DrumSpec,
    ctx: &RenderContext,
    buffers: &mut [Vec<Option<Cell>>],
    rng: &mut Pcg32,
) -> Result<(), EngineError> {
    let harmony = ctx.harmony;
    let sections = harmony.section_count();
    let max_applications = sections as i64 * 4;
    let max_steps = sections as i64 * 16;

    for (rule_index, rule) in spec.conditional_patterns.iter().enumerate() {
        let precondition = Condition::parse(&rule.precondition)?;
        let postcondition = Condition::parse(&rule.postcondition)?;
        let options = ParseOptions {
            wildcards: DRUM_WILDCARDS,
            default_velocity: ctx.structure.max_velocity as i32,
            default_ticks_per_beat: ctx.structure.ticks_per_beat,
        };
        let pattern =
            parse_pattern(&rule.pattern, &options)?.scale_to(ctx.structure.ticks_per_beat)?;
        let window = pattern.total_ticks() as usize;

        let mut cursor = 1i64;
        let mut applications = 0i64;
        let mut steps = 0i64;
        while cursor >= 1 && (cursor as usize) < sections {
            steps += 1;
            if steps > max_steps || applications > max_applications {
                warn!(
                    "conditional drum rule {} exceeded its application budget; disabling",
                    rule_index
                );
                break;
            }
            let boundary = harmony.section_range(cursor as usize).0;
            let matches = precondition.evaluate(ctx.activity_matrix, boundary - 1)?
                && postcondition.evaluate(ctx.activity_matrix, boundary)?;
            let applied = matches && rng.gen_bool(rule.probability.clamp(0.0, 1.0));
            if applied {
                applications += 1;
                let start = boundary.saturating_sub(window);
                for &target in &rule.targets {
                    write_window(&mut buffers[target], &pattern, start, boundary, rule.mode);
                }
            }
            let skip = if applied {
                rule.skip_when_applied
            } else {
                rule.skip_when_not_applied
            };
            cursor += 1 + skip;
        }
    }
    Ok(())
}

/// Rewrite `[start, end)` of a voice buffer from the rule pattern.
fn write_window(
    buffer: &mut [Option<Cell>],
    pattern: &Pattern,
    start: usize,
    end: usize,
    mode: ConditionalMode,
) {
    if mode == ConditionalMode::Replace {
        for cell in &mut buffer[start..end] {
            *cell = None;
        }
    }
    let mut tick = start;
    for entry in pattern.entries() {
        if tick >= end {
            break;
        }
        let ticks = (entry.ticks() as usize).min(end - tick);
        if let PatternEntry::Note { velocity, .. } = *entry {
            buffer[tick] = Some(Cell {
                velocity,
                ticks: ticks as u32,
            });
        }
        tick += ticks;
    }
}

/// Turn a tick-addressed buffer into a sequence, truncating notes at the
/// next hit.
fn buffer_to_sequence(buffer: &[Option<Cell>], pitch: i32, ctx: &RenderContext) -> Sequence {
    let total = buffer.len();
    let mut sequence = Sequence::new();
    let mut tick = 0usize;
    while tick < total {
        match buffer[tick] {
            Some(cell) => {
                let mut len = (cell.ticks as usize).min(total - tick);
                for ahead in 1..len {
                    if buffer[tick + ahead].is_some() {
                        len = ahead;
                        break;
                    }
                }
                sequence.add_note(pitch, ctx.map_velocity(cell.velocity), len as u32, false);
                tick += len;
            }
            None => {
                sequence.add_pause(1);
                tick += 1;
            }
        }
    }
    sequence
}
