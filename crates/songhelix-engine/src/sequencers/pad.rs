//! The pad engine: sustained chord polyphony.

use rand_pcg::Pcg32;

use songhelix_spec::sequencers::PadSpec;

use crate::activity::ActivityVector;
use crate::error::EngineError;
use crate::sequence::{Sequence, Track, TrackKind};

use super::RenderContext;

/// Render a pad track: one sequence per configured chord offset, each
/// holding its chord tone for the length of the chord run.
///
/// With `retrigger_pitches` off, a tone that does not change across a chord
/// boundary keeps sounding instead of being struck again.
pub(super) fn render(
    spec: &PadSpec,
    ctx: &RenderContext,
    vector: &ActivityVector,
    _rng: &mut Pcg32,
) -> Result<Track, EngineError> {
    if spec.offsets.is_empty() {
        return Err(EngineError::SequencerConfig {
            message: "pad engine needs at least one offset".to_string(),
        });
    }
    let mut track = Track::new(TrackKind::Melodic);
    for &offset in &spec.offsets {
        track
            .sequences
            .push(render_voice(spec, ctx, vector, offset));
    }
    Ok(track)
}

fn render_voice(
    spec: &PadSpec,
    ctx: &RenderContext,
    vector: &ActivityVector,
    offset: i32,
) -> Sequence {
    let harmony = ctx.harmony;
    let total = ctx.total_ticks();
    let velocity = ctx.map_velocity(spec.velocity as i32);
    let mut sequence = Sequence::new();

    // Pending note accumulated across chord runs when not retriggering.
    let mut held: Option<(i32, u32)> = None;
    let mut tick = 0usize;
    while tick < total {
        // Sub-run over which both chord and activity are constant.
        let run_end = tick + harmony.chord_ticks(tick);
        let active = vector.is_active(tick);
        let mut sub_end = tick + 1;
        while sub_end < run_end && vector.is_active(sub_end) == active {
            sub_end += 1;
        }
        let ticks = (sub_end - tick) as u32;
        let pitch = harmony.chord(tick).pitch_at_offset(offset);

        match (active, held.take()) {
            (true, Some((held_pitch, held_ticks)))
                if !spec.retrigger_pitches && held_pitch == pitch =>
            {
                held = Some((held_pitch, held_ticks + ticks));
            }
            (true, Some((held_pitch, held_ticks))) => {
                sequence.add_note(held_pitch, velocity, held_ticks, false);
                held = Some((pitch, ticks));
            }
            (true, None) => {
                held = Some((pitch, ticks));
            }
            (false, Some((held_pitch, held_ticks))) => {
                sequence.add_note(held_pitch, velocity, held_ticks, false);
                sequence.add_pause(ticks);
            }
            (false, None) => {
                sequence.add_pause(ticks);
            }
        }
        tick = sub_end;
    }
    if let Some((held_pitch, held_ticks)) = held {
        sequence.add_note(held_pitch, velocity, held_ticks, false);
    }
    sequence
}
