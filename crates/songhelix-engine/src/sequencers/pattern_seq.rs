//! The pattern engine: a fixed pattern with chord-tone offset resolution.

use rand_pcg::Pcg32;

use songhelix_spec::sequencers::PatternSeqSpec;

use crate::activity::ActivityVector;
use crate::error::EngineError;
use crate::pattern::{Pattern, PatternEntry};
use crate::patterns::{build_pattern, PatternContext};
use crate::sequence::{Sequence, Track, TrackKind};

use super::{restarts_at, RenderContext};

/// Render a pattern track.
///
/// The pattern position advances with the song ticks (wrapping), resetting
/// at the configured restart boundaries. Note offsets resolve as chord-tone
/// indices with octave wrap; a note never sustains past its chord run.
pub(super) fn render(
    spec: &PatternSeqSpec,
    ctx: &RenderContext,
    vector: &ActivityVector,
    rng: &mut Pcg32,
) -> Result<Track, EngineError> {
    if spec.patterns.is_empty() {
        return Err(EngineError::SequencerConfig {
            message: "pattern engine needs at least one pattern".to_string(),
        });
    }
    let pattern_ctx = PatternContext {
        wildcards: &[],
        max_velocity: ctx.structure.max_velocity,
    };
    // Several patterns concatenate into one long loop.
    let mut entries = Vec::new();
    let mut ticks_per_beat = ctx.structure.ticks_per_beat;
    for source in &spec.patterns {
        let pattern =
            build_pattern(source, &pattern_ctx, rng)?.scale_to(ctx.structure.ticks_per_beat)?;
        ticks_per_beat = pattern.ticks_per_beat();
        entries.extend_from_slice(pattern.entries());
    }
    let pattern = Pattern::new(entries, ticks_per_beat);
    let pattern_ticks = pattern.total_ticks() as usize;
    if pattern_ticks == 0 {
        return Err(EngineError::SequencerConfig {
            message: "pattern engine pattern has zero length".to_string(),
        });
    }
    // Entry start offsets within the pattern, for mid-entry lookups.
    let mut starts = Vec::with_capacity(pattern.len());
    let mut offset = 0usize;
    for entry in pattern.entries() {
        starts.push(offset);
        offset += entry.ticks() as usize;
    }

    let harmony = ctx.harmony;
    let total = ctx.total_ticks();
    let mut sequence = Sequence::new();
    let mut tick = 0usize;
    let mut pos = 0usize;
    while tick < total {
        if restarts_at(spec.pattern_restart_mode, harmony, tick) {
            pos = 0;
        }
        let pos_in_pattern = pos % pattern_ticks;
        let entry_index = match starts.binary_search(&pos_in_pattern) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let entry = &pattern.entries()[entry_index];
        let offset_in_entry = pos_in_pattern - starts[entry_index];
        let entry_remaining = entry.ticks() as usize - offset_in_entry;

        let chord_end = tick + harmony.chord_ticks(tick);
        let limit = entry_remaining.min(chord_end - tick).min(total - tick);
        let len = clip_to_restart(spec, harmony, tick, limit);

        match *entry {
            PatternEntry::Note {
                pitch: Some(note_offset),
                velocity,
                legato,
                ..
            } if offset_in_entry == 0 && vector.is_active(tick) => {
                let chord = harmony.chord(tick);
                sequence.add_note(
                    chord.pitch_at_offset(note_offset),
                    ctx.map_velocity(velocity),
                    len as u32,
                    legato,
                );
            }
            _ => sequence.add_pause(len as u32),
        }
        tick += len;
        pos += len;
    }

    let mut track = Track::new(TrackKind::Melodic);
    track.sequences.push(sequence);
    Ok(track)
}

/// Shorten a span so it does not cross the next restart boundary.
fn clip_to_restart(
    spec: &PatternSeqSpec,
    harmony: &crate::harmony::Harmony,
    tick: usize,
    limit: usize,
) -> usize {
    for ahead in 1..limit {
        if restarts_at(spec.pattern_restart_mode, harmony, tick + ahead) {
            return ahead;
        }
    }
    limit.max(1)
}
