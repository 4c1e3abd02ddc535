//! Exact mode: randomized backtracking over sections.
//!
//! Each section clones the previous voice bitset and randomly sets or clears
//! bits until the wanted count is reached, checking every constraint that
//! can be evaluated early. A failed branch is retried up to the section's
//! branch budget, then the search backtracks one section. Section 0 is
//! bounded only by the global iteration budget.

use std::collections::HashMap;

use log::debug;
use rand::Rng;
use rand_pcg::Pcg32;

use crate::error::EngineError;

use super::{SolveContext, VoiceState};

/// Branch budget per section beyond the first. With 1 the search degrades to
/// random restart; with 3 or more backtracking is rarely triggered.
const SECTION_TRIES: u64 = 2;

/// Probability of shuffling one voice in and one out when the wanted count
/// does not change.
const SHUFFLE_PROBABILITY: f64 = 0.5;

struct Failure;

type FailureCounts = HashMap<(usize, &'static str), u64>;

/// Solve the matrix; returns one voice bitset per section.
pub(super) fn solve(ctx: &SolveContext, rng: &mut Pcg32) -> Result<Vec<u64>, EngineError> {
    let sections = ctx.sections();
    let voices = ctx.voices();

    // Accepted bitsets and the per-voice states after each accepted section.
    let mut bitsets: Vec<u64> = Vec::with_capacity(sections);
    let mut states: Vec<Vec<VoiceState>> = Vec::with_capacity(sections);
    let mut tries = vec![0u64; sections];
    let mut failures: FailureCounts = HashMap::new();
    let mut iterations = 0u64;

    let mut s = 0usize;
    while s < sections {
        iterations += 1;
        if iterations > ctx.max_iterations {
            let mut counts: Vec<(String, String, u64)> = std::mem::take(&mut failures)
                .into_iter()
                .map(|((voice, reason), count)| {
                    (ctx.limits[voice].name.clone(), reason.to_string(), count)
                })
                .collect();
            counts.sort_by(|a, b| b.2.cmp(&a.2));
            debug!("activity solver gave up after {} iterations: {:?}", iterations, counts);
            return Err(EngineError::ConstraintUnsatisfiable {
                max_iterations: ctx.max_iterations,
                failures: counts,
            });
        }

        let previous_bits = s.checked_sub(1).map(|p| bitsets[p]).unwrap_or(0);
        let previous_states = s
            .checked_sub(1)
            .map(|p| states[p].clone())
            .unwrap_or_else(|| vec![VoiceState::default(); voices]);

        match try_section(ctx, s, previous_bits, &previous_states, rng, &mut failures) {
            Ok((bits, new_states)) => {
                bitsets.push(bits);
                states.push(new_states);
                s += 1;
            }
            Err(Failure) => {
                tries[s] += 1;
                if s > 0 && tries[s] >= SECTION_TRIES {
                    tries[s] = 0;
                    bitsets.pop();
                    states.pop();
                    s -= 1;
                }
            }
        }
    }
    Ok(bitsets)
}

/// Attempt one candidate bitset for section `s`.
fn try_section(
    ctx: &SolveContext,
    s: usize,
    previous_bits: u64,
    previous_states: &[VoiceState],
    rng: &mut Pcg32,
    failures: &mut FailureCounts,
) -> Result<(u64, Vec<VoiceState>), Failure> {
    let voices = ctx.voices();
    let wanted = ctx.wanted[s].min(voices as u32);
    let mut bits = previous_bits;
    let mut fail = |voice: usize, reason: &'static str| {
        *failures.entry((voice, reason)).or_insert(0) += 1;
        Failure
    };

    let diff = wanted as i64 - bits.count_ones() as i64;
    if diff > 0 {
        for _ in 0..diff {
            let voice = random_bit(!bits, voices, rng).ok_or(Failure)?;
            let state = &previous_states[voice];
            if state.active_sections > 0 {
                if state.run_length < ctx.limits[voice].min_pause_length {
                    return Err(fail(voice, "pause shorter than min_pause_length"));
                }
                if state.run_length > ctx.limits[voice].max_pause_length {
                    return Err(fail(voice, "pause longer than max_pause_length"));
                }
            }
            bits |= 1u64 << voice;
        }
    } else if diff < 0 {
        for _ in 0..-diff {
            let voice = random_bit(bits, voices, rng).ok_or(Failure)?;
            if previous_states[voice].run_length < ctx.limits[voice].min_segment_length {
                return Err(fail(voice, "segment shorter than min_segment_length"));
            }
            bits &= !(1u64 << voice);
        }
    } else if bits.count_ones() as usize != voices && rng.gen_bool(SHUFFLE_PROBABILITY) {
        // Quiet shuffle: swap one voice in and one out.
        if let (Some(activate), Some(deactivate)) = (
            random_bit(!bits, voices, rng),
            random_bit(bits, voices, rng),
        ) {
            let state = &previous_states[activate];
            if state.active_sections > 0 {
                if state.run_length < ctx.limits[activate].min_pause_length {
                    return Err(fail(activate, "pause shorter than min_pause_length"));
                }
                if state.run_length > ctx.limits[activate].max_pause_length {
                    return Err(fail(activate, "pause longer than max_pause_length"));
                }
            }
            if previous_states[deactivate].run_length
                < ctx.limits[deactivate].min_segment_length
            {
                return Err(fail(deactivate, "segment shorter than min_segment_length"));
            }
            bits |= 1u64 << activate;
            bits &= !(1u64 << deactivate);
        }
    }

    let states = advance_states(ctx, s, bits, previous_states);
    for voice in 0..voices {
        if let Err(reason) = check_voice(ctx, s, voice, &states[voice]) {
            return Err(fail(voice, reason));
        }
    }
    Ok((bits, states))
}

/// Advance every voice's running state into section `s` under `bits`.
pub(super) fn advance_states(
    ctx: &SolveContext,
    s: usize,
    bits: u64,
    previous: &[VoiceState],
) -> Vec<VoiceState> {
    let section = s as u32;
    previous
        .iter()
        .enumerate()
        .map(|(voice, old)| {
            let active = bits & (1u64 << voice) != 0;
            let mut state = *old;
            if active {
                state.active_sections += 1;
                state.active_ticks += ctx.section_ticks[s];
                if state.first_active.is_none() {
                    state.first_active = Some(section);
                }
                if !old.active {
                    state.segments += 1;
                }
                if in_stop_after_window(ctx, s, &ctx.limits[voice]) {
                    state.active_in_stop = true;
                }
            }
            state.run_length = if s > 0 && old.active == active {
                old.run_length + 1
            } else {
                1
            };
            state.active = active;
            state
        })
        .collect()
}

fn in_stop_after_window(ctx: &SolveContext, s: usize, limits: &super::VoiceLimits) -> bool {
    match limits.stop_after_section {
        Some(stop_after) => s as u32 + stop_after >= ctx.sections() as u32,
        None => true,
    }
}

/// Every constraint that can be evaluated with the song prefix up to and
/// including section `s`. Returns the violated constraint's name.
pub(super) fn check_voice(
    ctx: &SolveContext,
    s: usize,
    voice: usize,
    state: &VoiceState,
) -> Result<(), &'static str> {
    let limits = &ctx.limits[voice];
    let sections = ctx.sections() as u32;
    let section = s as u32;
    let last = s + 1 == ctx.sections();

    if state.active {
        if let Some(start_after) = limits.start_after_section {
            if section < start_after {
                return Err("active before start_after_section");
            }
        }
        if let Some(stop_before) = limits.stop_before_section {
            if section + stop_before >= sections {
                return Err("active inside stop_before_section window");
            }
        }
        if let Some(start_before) = limits.start_before_section {
            if state.first_active.is_some_and(|f| f > start_before) {
                return Err("started after start_before_section");
            }
        }
        if state.run_length > limits.max_segment_length {
            return Err("segment longer than max_segment_length");
        }
        if state.active_ticks > limits.max_active_ticks {
            return Err("more active ticks than max_active allows");
        }
    } else if state.active_sections > 0 && state.run_length > limits.max_pause_length {
        // A pause that has already outgrown the maximum can never legally
        // end, and a trailing pause never has to: only fail once the song
        // cannot absorb it as trailing silence.
        if limits.min_active_ticks > state.active_ticks && !last {
            return Err("pause longer than max_pause_length");
        }
    }

    if state.segments > limits.max_segment_count {
        return Err("more segments than max_segment_count");
    }
    // Feasibility: enough sections left to reach the minimum segment count.
    let remaining_sections = sections - section - 1;
    if state.segments + remaining_sections.div_ceil(2) < limits.min_segment_count {
        return Err("cannot reach min_segment_count");
    }
    // Feasibility: enough ticks left to reach the minimum activity.
    let must_be_active = !limits.allow_inactive || state.active_sections > 0;
    if must_be_active
        && state.active_ticks + ctx.remaining_ticks(s) < limits.min_active_ticks
    {
        return Err("cannot reach min_active");
    }
    if let Some(start_before) = limits.start_before_section {
        if must_be_active && state.first_active.is_none() && section >= start_before {
            return Err("not started by start_before_section");
        }
    }

    if last {
        if state.active_sections == 0 {
            if !limits.allow_inactive {
                return Err("voice never became active");
            }
        } else {
            if state.active_ticks < limits.min_active_ticks {
                return Err("fewer active ticks than min_active requires");
            }
            if state.segments < limits.min_segment_count {
                return Err("fewer segments than min_segment_count");
            }
            if state.active && state.run_length < limits.min_segment_length {
                return Err("final segment shorter than min_segment_length");
            }
            if limits.stop_after_section.is_some_and(|k| k > 0) && !state.active_in_stop {
                return Err("stopped before stop_after_section window");
            }
        }
    }
    Ok(())
}

/// Uniformly random set bit of `mask` below `voices`, if any.
fn random_bit(mask: u64, voices: usize, rng: &mut Pcg32) -> Option<usize> {
    let mask = mask & low_bits(voices);
    let count = mask.count_ones();
    if count == 0 {
        return None;
    }
    let index = rng.gen_range(0..count);
    let mut seen = 0;
    for voice in 0..voices {
        if mask & (1u64 << voice) != 0 {
            if seen == index {
                return Some(voice);
            }
            seen += 1;
        }
    }
    None
}

fn low_bits(n: usize) -> u64 {
    if n >= 64 {
        !0
    } else {
        (1u64 << n) - 1
    }
}
