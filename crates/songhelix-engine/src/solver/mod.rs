//! The activity solver: decides, per chord section, which voices play.
//!
//! The solver works on a boolean matrix of (section, voice) bits. A wanted
//! activity-count curve shapes the song (fade-in, middle, fade-out); the
//! exact strategy finds a matrix honoring every per-voice constraint by
//! randomized backtracking, the greedy strategy approximates it section by
//! section with a violation score. The solved matrix is inflated to per-tick
//! activity vectors, boundary-shifted, and run through the configured
//! modification operators.

use log::debug;
use rand_pcg::Pcg32;

use songhelix_spec::arrangement::{ActivityVectorSpec, ArrangementSpec, ConstraintMode};

use crate::activity::{ActivityMatrix, ActivityVector};
use crate::error::EngineError;
use crate::harmony::Harmony;

mod counts;
mod exact;
mod greedy;
mod postprocess;

pub use counts::wanted_counts;

/// Exponential cap parameters for the computed maximum activity count:
/// `N * (f + (1 - f) * e^(-lambda * (N - 1)))`.
const CAP_FLOOR: f64 = 0.4;
const CAP_LAMBDA: f64 = 0.2;

/// Voices are kept in one machine word per section.
pub const MAX_VOICES: usize = 64;

/// Per-voice constraint limits with percentages resolved to ticks.
#[derive(Debug, Clone)]
pub(crate) struct VoiceLimits {
    pub name: String,
    pub min_active_ticks: u64,
    pub max_active_ticks: u64,
    pub allow_inactive: bool,
    pub start_before_section: Option<u32>,
    pub start_after_section: Option<u32>,
    pub stop_before_section: Option<u32>,
    pub stop_after_section: Option<u32>,
    pub min_segment_count: u32,
    pub max_segment_count: u32,
    pub min_segment_length: u32,
    pub max_segment_length: u32,
    pub min_pause_length: u32,
    pub max_pause_length: u32,
}

impl VoiceLimits {
    fn from_spec(spec: &ActivityVectorSpec, total_ticks: u64) -> Self {
        VoiceLimits {
            name: spec.name.clone(),
            min_active_ticks: (spec.min_active / 100.0 * total_ticks as f64).ceil() as u64,
            max_active_ticks: (spec.max_active / 100.0 * total_ticks as f64).floor() as u64,
            allow_inactive: spec.allow_inactive,
            start_before_section: spec.start_before_section,
            start_after_section: spec.start_after_section,
            stop_before_section: spec.stop_before_section,
            stop_after_section: spec.stop_after_section,
            min_segment_count: spec.min_segment_count.unwrap_or(0),
            max_segment_count: spec.max_segment_count.unwrap_or(u32::MAX),
            min_segment_length: spec.min_segment_length.unwrap_or(1),
            max_segment_length: spec.max_segment_length.unwrap_or(u32::MAX),
            min_pause_length: spec.min_pause_length.unwrap_or(1),
            max_pause_length: spec.max_pause_length.unwrap_or(u32::MAX),
        }
    }
}

/// Running per-voice state along one solve path.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct VoiceState {
    pub active: bool,
    /// Sections active so far.
    pub active_sections: u32,
    /// Ticks active so far.
    pub active_ticks: u64,
    /// Active segments started so far.
    pub segments: u32,
    /// Length of the current same-state run, in sections.
    pub run_length: u32,
    /// First section the voice became active in.
    pub first_active: Option<u32>,
    /// Whether the voice was active inside its stop-after window.
    pub active_in_stop: bool,
}

/// Shared solve context.
pub(crate) struct SolveContext {
    pub limits: Vec<VoiceLimits>,
    pub wanted: Vec<u32>,
    /// Tick length of each section.
    pub section_ticks: Vec<u64>,
    pub total_ticks: u64,
    pub max_iterations: u64,
}

impl SolveContext {
    pub fn sections(&self) -> usize {
        self.section_ticks.len()
    }

    pub fn voices(&self) -> usize {
        self.limits.len()
    }

    /// Ticks remaining after section `s` (exclusive).
    pub fn remaining_ticks(&self, s: usize) -> u64 {
        self.section_ticks[s + 1..].iter().sum()
    }

    fn new(
        arrangement: &ArrangementSpec,
        harmony: &Harmony,
        rng: &mut Pcg32,
    ) -> Result<Self, EngineError> {
        let voices = arrangement.activity_vectors.len();
        if voices == 0 || voices > MAX_VOICES {
            return Err(EngineError::SequencerConfig {
                message: format!("activity solver supports 1..={} voices, got {}", MAX_VOICES, voices),
            });
        }
        let total_ticks = harmony.total_ticks() as u64;
        let limits: Vec<VoiceLimits> = arrangement
            .activity_vectors
            .iter()
            .map(|spec| VoiceLimits::from_spec(spec, total_ticks))
            .collect();
        let section_ticks: Vec<u64> = (0..harmony.section_count())
            .map(|s| {
                let (start, end) = harmony.section_range(s);
                (end - start) as u64
            })
            .collect();
        let cap = activity_cap(arrangement, voices as u32);
        let wanted = counts::wanted_counts(
            section_ticks.len(),
            &arrangement.start_activity_counts,
            &arrangement.stop_activity_counts,
            arrangement.min_activity_count,
            cap,
            arrangement.max_activity_change_count,
            rng,
        );
        debug!("activity solver: wanted counts {:?} (cap {})", wanted, cap);
        Ok(SolveContext {
            limits,
            wanted,
            section_ticks,
            total_ticks,
            max_iterations: arrangement.max_iterations,
        })
    }
}

/// The activity-count cap: the configured maximum, or the exponential cap
/// when it is 0.
pub fn activity_cap(arrangement: &ArrangementSpec, voices: u32) -> u32 {
    if arrangement.max_activity_count > 0 {
        arrangement.max_activity_count.min(voices)
    } else {
        let n = voices as f64;
        let cap = n * (CAP_FLOOR + (1.0 - CAP_FLOOR) * (-CAP_LAMBDA * (n - 1.0)).exp());
        (cap.round() as u32).clamp(1, voices)
    }
}

/// Solve the activity matrix for a song.
pub fn solve(
    arrangement: &ArrangementSpec,
    harmony: &Harmony,
    rng: &mut Pcg32,
) -> Result<ActivityMatrix, EngineError> {
    let ctx = SolveContext::new(arrangement, harmony, rng)?;
    let bitsets = match arrangement.constraint_mode {
        ConstraintMode::Exact => exact::solve(&ctx, rng)?,
        ConstraintMode::Greedy => greedy::solve(&ctx, &arrangement.greedy_weights, rng)?,
    };

    let mut matrix = ActivityMatrix::new();
    for (voice, spec) in arrangement.activity_vectors.iter().enumerate() {
        let mut vector = ActivityVector::new();
        for (section, bits) in bitsets.iter().enumerate() {
            let ticks = ctx.section_ticks[section] as usize;
            if bits & (1u64 << voice) != 0 {
                vector.add_activity(ticks);
            } else {
                vector.add_inactivity(ticks);
            }
        }
        vector.shift_interval_boundaries(spec.start_shift, spec.stop_shift);
        matrix.add(spec.name.clone(), vector);
    }

    postprocess::apply_modifiers(&mut matrix, &arrangement.modifiers, harmony)?;
    debug!("activity matrix:\n{}", matrix.dump(harmony));
    Ok(matrix)
}

#[cfg(test)]
mod tests;
