//! The arpeggio engine: chord tones played through a pattern.

use rand_pcg::Pcg32;

use songhelix_spec::sequencers::ArpeggioSpec;

use crate::activity::ActivityVector;
use crate::error::EngineError;
use crate::pattern::{Pattern, PatternEntry};
use crate::patterns::{build_pattern, PatternContext};
use crate::sequence::{Sequence, Track, TrackKind};

use super::RenderContext;

/// Render an arpeggio track.
///
/// Per chord run, the shortest pattern whose tick length covers the run is
/// chosen, falling back to the longest available; the pattern is walked from
/// the run start and its offsets resolve as chord tones with octave wrap.
pub(super) fn render(
    spec: &ArpeggioSpec,
    ctx: &RenderContext,
    vector: &ActivityVector,
    rng: &mut Pcg32,
) -> Result<Track, EngineError> {
    if spec.patterns.is_empty() {
        return Err(EngineError::SequencerConfig {
            message: "arpeggio engine needs at least one pattern".to_string(),
        });
    }
    let pattern_ctx = PatternContext {
        wildcards: &[],
        max_velocity: ctx.structure.max_velocity,
    };
    let mut patterns: Vec<Pattern> = spec
        .patterns
        .iter()
        .map(|source| {
            build_pattern(source, &pattern_ctx, rng)
                .and_then(|p| p.scale_to(ctx.structure.ticks_per_beat))
        })
        .collect::<Result<_, _>>()?;
    patterns.sort_by_key(Pattern::total_ticks);

    let harmony = ctx.harmony;
    let total = ctx.total_ticks();
    let mut sequence = Sequence::new();
    let mut tick = 0usize;
    while tick < total {
        let run_ticks = harmony.chord_ticks(tick);
        let chord = harmony.chord(tick);
        let pattern = choose_pattern(&patterns, run_ticks as u32);

        // Walk pattern entries across the chord run.
        let run_end = tick + run_ticks;
        let mut entry_index = 0usize;
        while tick < run_end {
            let entry = pattern.entry_wrapped(entry_index);
            entry_index += 1;
            let ticks = (entry.ticks() as usize).min(run_end - tick);
            match *entry {
                PatternEntry::Note {
                    pitch: Some(offset),
                    velocity,
                    legato,
                    ..
                } if vector.is_active(tick) => {
                    sequence.add_note(
                        chord.pitch_at_offset(offset),
                        ctx.map_velocity(velocity),
                        ticks as u32,
                        legato && tick + ticks < run_end,
                    );
                }
                _ => sequence.add_pause(ticks as u32),
            }
            tick += ticks;
        }
    }

    let mut track = Track::new(TrackKind::Melodic);
    track.sequences.push(sequence);
    Ok(track)
}

/// Shortest pattern covering the chord run, else the longest available.
/// `patterns` is sorted by tick length.
fn choose_pattern(patterns: &[Pattern], run_ticks: u32) -> &Pattern {
    patterns
        .iter()
        .find(|p| p.total_ticks() >= run_ticks)
        .unwrap_or_else(|| patterns.last().unwrap())
}
