//! Greedy mode: scored random draw per section, no backtracking.
//!
//! Candidates are drawn the same way exact mode mutates bitsets, but instead
//! of failing on a violated constraint each candidate is scored by a
//! weighted violation sum. All candidates tied at the minimum score are kept
//! (deduplicated) and one is picked uniformly. Constraint satisfaction is
//! approximate; intended for long songs with large voice sets.

use std::collections::HashMap;

use rand::Rng;
use rand_pcg::Pcg32;

use songhelix_spec::arrangement::GreedyWeights;

use crate::error::EngineError;

use super::exact::advance_states;
use super::{SolveContext, VoiceState};

/// Activity-percentage scoring only kicks in once the song prefix is long
/// enough to be meaningful.
const ACTIVITY_SCORE_FROM_SECTION: usize = 5;

/// Solve the matrix; returns one voice bitset per section.
pub(super) fn solve(
    ctx: &SolveContext,
    weights: &GreedyWeights,
    rng: &mut Pcg32,
) -> Result<Vec<u64>, EngineError> {
    let sections = ctx.sections();
    let voices = ctx.voices();
    let mut bitsets = Vec::with_capacity(sections);
    let mut states = vec![VoiceState::default(); voices];

    for s in 0..sections {
        let previous_bits = bitsets.last().copied().unwrap_or(0);
        let mut scored: HashMap<u64, u64> = HashMap::new();
        for _ in 0..ctx.max_iterations {
            let candidate = draw_candidate(ctx, s, previous_bits, rng);
            scored
                .entry(candidate)
                .or_insert_with(|| score(ctx, s, candidate, &states, weights));
        }
        let best = scored.values().copied().min().unwrap_or(0);
        let tied: Vec<u64> = scored
            .iter()
            .filter(|(_, &score)| score == best)
            .map(|(&bits, _)| bits)
            .collect();
        let chosen = tied[rng.gen_range(0..tied.len())];
        states = advance_states(ctx, s, chosen, &states);
        bitsets.push(chosen);
    }
    Ok(bitsets)
}

/// Mutate the previous bitset toward the wanted count, without constraint
/// checks.
fn draw_candidate(ctx: &SolveContext, s: usize, previous: u64, rng: &mut Pcg32) -> u64 {
    let voices = ctx.voices();
    let wanted = ctx.wanted[s].min(voices as u32);
    let mut bits = previous;
    while bits.count_ones() < wanted {
        bits |= 1u64 << rng.gen_range(0..voices);
    }
    while bits.count_ones() > wanted {
        let active: Vec<usize> = (0..voices).filter(|v| bits & (1u64 << v) != 0).collect();
        bits &= !(1u64 << active[rng.gen_range(0..active.len())]);
    }
    bits
}

/// Weighted violation sum for one candidate bitset at section `s`.
fn score(
    ctx: &SolveContext,
    s: usize,
    bits: u64,
    previous: &[VoiceState],
    weights: &GreedyWeights,
) -> u64 {
    let states = advance_states(ctx, s, bits, previous);
    let sections = ctx.sections() as u32;
    let section = s as u32;
    let mut total = 0u64;

    for (voice, state) in states.iter().enumerate() {
        let limits = &ctx.limits[voice];
        let old = &previous[voice];
        let activated = state.active && !old.active;
        let deactivated = !state.active && old.active;

        if activated && old.active_sections > 0 {
            if old.run_length < limits.min_pause_length {
                total += weights.length as u64;
            }
            if old.run_length > limits.max_pause_length {
                total += weights.length as u64;
            }
        }
        if deactivated && old.run_length < limits.min_segment_length {
            total += weights.length as u64;
        }
        if state.active && state.run_length > limits.max_segment_length {
            total += weights.length as u64;
        }

        if state.segments > limits.max_segment_count {
            total += weights.segment_count as u64;
        }
        let remaining = sections - section - 1;
        if state.segments + remaining.div_ceil(2) < limits.min_segment_count {
            total += weights.segment_count as u64;
        }

        if state.active {
            if limits
                .start_after_section
                .is_some_and(|start_after| section < start_after)
            {
                total += weights.window as u64;
            }
            if limits
                .stop_before_section
                .is_some_and(|stop_before| section + stop_before >= sections)
            {
                total += weights.window as u64;
            }
            if limits
                .start_before_section
                .is_some_and(|start_before| state.first_active.is_some_and(|f| f > start_before))
            {
                total += weights.window as u64;
            }
        }

        if s >= ACTIVITY_SCORE_FROM_SECTION {
            let elapsed: u64 = ctx.section_ticks[..=s].iter().sum();
            let pct = state.active_ticks as f64 / elapsed as f64 * 100.0;
            let min_pct = limits.min_active_ticks as f64 / ctx.total_ticks as f64 * 100.0;
            let max_pct = limits.max_active_ticks as f64 / ctx.total_ticks as f64 * 100.0;
            let skip_min = limits.allow_inactive && state.active_sections == 0;
            if pct < min_pct && !skip_min {
                total += (weights.activity as f64 * (min_pct - pct)) as u64;
            } else if pct > max_pct {
                total += (weights.activity as f64 * (pct - max_pct)) as u64;
            }
        }
    }
    total
}
