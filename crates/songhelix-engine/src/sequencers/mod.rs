//! Sequence engines: render per-instrument note sequences.
//!
//! Every engine honors the shared contract: inactive ticks become pauses, a
//! note never sustains past the chord run it starts in, and velocities are
//! song units mapped onto MIDI 0-127 at emission time.

use rand_pcg::Pcg32;

use songhelix_spec::sequencers::{PatternRestartMode, SequenceEngineSpec};

use crate::activity::{ActivityMatrix, ActivityVector};
use crate::error::EngineError;
use crate::harmony::Harmony;
use crate::sequence::Track;
use crate::song::Structure;

mod arpeggio;
mod condition;
mod drum;
mod melody;
mod pad;
mod pattern_seq;

pub use condition::Condition;

/// Shared inputs for all sequence engines.
pub struct RenderContext<'a> {
    pub structure: &'a Structure,
    pub harmony: &'a Harmony,
    /// All named activity vectors (drum conditions may reference any).
    pub activity_matrix: &'a ActivityMatrix,
    /// Per-track velocity scale (1.0 = unscaled).
    pub velocity_scale: f64,
}

impl RenderContext<'_> {
    /// Map a song-unit velocity onto MIDI 0-127.
    ///
    /// 0 maps to 0, the maximum velocity to 127, monotone in between.
    pub fn map_velocity(&self, velocity: i32) -> u8 {
        let scaled = (velocity as f64 * self.velocity_scale).round() as i64;
        map_velocity(scaled, self.structure.max_velocity)
    }

    /// Total song ticks.
    pub fn total_ticks(&self) -> usize {
        self.harmony.total_ticks()
    }
}

/// The velocity mapping curve shared by all engines.
pub fn map_velocity(velocity: i64, max_velocity: u32) -> u8 {
    if velocity <= 0 {
        return 0;
    }
    let max = max_velocity as i64;
    if max <= 126 {
        return velocity.clamp(0, 127) as u8;
    }
    let mapped = 1 + (velocity - 1) * 126 / (max - 126);
    mapped.clamp(0, 127) as u8
}

/// Whether the pattern cursor resets at `tick`.
pub(crate) fn restarts_at(mode: PatternRestartMode, harmony: &Harmony, tick: usize) -> bool {
    match mode {
        PatternRestartMode::Never => false,
        PatternRestartMode::ChordSection => harmony.section_boundaries().contains(&tick),
        PatternRestartMode::Chord => harmony.is_chord_boundary(tick),
    }
}

/// Render one track from its engine configuration.
pub fn render_track(
    spec: &SequenceEngineSpec,
    ctx: &RenderContext,
    vectors: &[&ActivityVector],
    rng: &mut Pcg32,
) -> Result<Track, EngineError> {
    let primary = || {
        vectors
            .first()
            .copied()
            .ok_or_else(|| EngineError::SequencerConfig {
                message: "sequence engine needs at least one activity vector".to_string(),
            })
    };
    match spec {
        SequenceEngineSpec::Arpeggio(spec) => arpeggio::render(spec, ctx, primary()?, rng),
        SequenceEngineSpec::Pad(spec) => pad::render(spec, ctx, primary()?, rng),
        SequenceEngineSpec::Melody(spec) => melody::render(spec, ctx, primary()?, rng),
        SequenceEngineSpec::Pattern(spec) => pattern_seq::render(spec, ctx, primary()?, rng),
        SequenceEngineSpec::Drum(spec) => drum::render(spec, ctx, vectors, rng),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::chord::Chord;
    use crate::harmony::Harmony;

    /// A harmony of equal sections alternating Am and C.
    pub fn harmony(sections: usize, ticks: usize) -> Harmony {
        let am = Chord::from_name("Am", 12).unwrap();
        let c = Chord::from_name("C", 12).unwrap();
        let timeline: Vec<(Chord, usize, bool)> = (0..sections)
            .map(|s| (if s % 2 == 0 { am } else { c }, ticks, true))
            .collect();
        Harmony::from_timeline(&timeline, sections * ticks).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn velocity_mapping_endpoints_and_monotonicity() {
        let max = 32767u32;
        assert_eq!(map_velocity(0, max), 0);
        assert_eq!(map_velocity(32767, max), 127);
        assert_eq!(map_velocity(1, max), 1);
        let mut last = 0;
        for v in (0..=32767).step_by(97) {
            let mapped = map_velocity(v, max);
            assert!(mapped >= last, "not monotone at {}", v);
            last = mapped;
        }
    }

    #[test]
    fn velocity_mapping_small_max() {
        assert_eq!(map_velocity(100, 100), 100);
        assert_eq!(map_velocity(400, 100), 127);
    }
}
