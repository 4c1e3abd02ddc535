//! The wanted activity-count curve.
//!
//! Shapes the song: a fade-in phase following `start_activity_counts`, a
//! random middle phase, a bridge section, and a fade-out phase following
//! `stop_activity_counts`.

use rand::Rng;
use rand_pcg::Pcg32;

/// Probability of keeping a middle-phase draw equal to its predecessor.
const PLATEAU_ACCEPT: f64 = 0.1;
const MAX_MIDDLE_DRAWS: u32 = 1000;

/// Compute the wanted activity count for every section.
pub fn wanted_counts(
    sections: usize,
    start_counts: &[u32],
    stop_counts: &[u32],
    min_activity_count: u32,
    cap: u32,
    max_change: u32,
    rng: &mut Pcg32,
) -> Vec<u32> {
    let mut wanted = Vec::with_capacity(sections);
    // Fade-in covers at most the first half of the song.
    let increase_till = (sections / 2).min(start_counts.len()) as i64 - 1;
    // Fade-out covers at most the second half; the section before it bridges.
    let decrease_from = if stop_counts.is_empty() {
        sections as i64
    } else {
        sections as i64 - (sections / 2).min(stop_counts.len() + 1) as i64
    };

    let lower = min_activity_count.min(cap);
    let mut previous = 0u32;
    for s in 0..sections as i64 {
        let count = if s <= increase_till {
            start_counts[s as usize].min(cap)
        } else if s > decrease_from {
            stop_counts[(s - decrease_from - 1) as usize].min(cap)
        } else if s == decrease_from && !stop_counts.is_empty() {
            bridge_count(previous, stop_counts[0].min(cap), cap)
        } else {
            middle_count(previous, lower, cap, max_change, rng)
        };
        wanted.push(count);
        previous = count;
    }
    wanted
}

/// Bridge between the middle phase and the fade-out: average the neighbors,
/// then walk up while equal to either endpoint and below the cap.
fn bridge_count(last: u32, first_stop: u32, cap: u32) -> u32 {
    let mut count = (last + first_stop) / 2;
    while (count == last || count == first_stop) && count < cap {
        count += 1;
    }
    count
}

/// Uniform draw in `[lower, cap]`, rejecting jumps larger than `max_change`
/// and re-rolling plateau draws with probability 0.9.
fn middle_count(previous: u32, lower: u32, cap: u32, max_change: u32, rng: &mut Pcg32) -> u32 {
    let mut last_draw = lower;
    for _ in 0..MAX_MIDDLE_DRAWS {
        let count = rng.gen_range(lower..=cap.max(lower));
        last_draw = count;
        if previous > 0 && count.abs_diff(previous) > max_change {
            continue;
        }
        if count == previous && !rng.gen_bool(PLATEAU_ACCEPT) {
            continue;
        }
        return count;
    }
    last_draw
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn fade_phases_follow_configured_counts() {
        let mut rng = Pcg32::seed_from_u64(1);
        let wanted = wanted_counts(8, &[1, 2, 3], &[3, 2, 1], 2, 5, 2, &mut rng);
        assert_eq!(wanted.len(), 8);
        assert_eq!(&wanted[0..3], &[1, 2, 3]);
        assert_eq!(&wanted[5..8], &[3, 2, 1]);
        // Middle and bridge stay within the cap.
        assert!(wanted.iter().all(|&c| c <= 5));
    }

    #[test]
    fn fade_in_is_clamped_to_half_the_song() {
        let mut rng = Pcg32::seed_from_u64(1);
        let wanted = wanted_counts(4, &[1, 2, 3, 4, 5], &[], 1, 5, 5, &mut rng);
        // Only sections/2 = 2 fade-in sections are used.
        assert_eq!(&wanted[0..2], &[1, 2]);
    }

    #[test]
    fn counts_are_clamped_to_cap() {
        let mut rng = Pcg32::seed_from_u64(1);
        let wanted = wanted_counts(6, &[9, 9], &[9], 1, 3, 9, &mut rng);
        assert!(wanted.iter().all(|&c| c <= 3));
    }

    #[test]
    fn middle_phase_respects_max_change() {
        let mut rng = Pcg32::seed_from_u64(42);
        for _ in 0..20 {
            let wanted = wanted_counts(16, &[1], &[1], 1, 8, 1, &mut rng);
            let middle_end = 16 - (16 / 2).min(2);
            for s in 1..middle_end {
                assert!(
                    wanted[s].abs_diff(wanted[s - 1]) <= 1,
                    "jump at {} in {:?}",
                    s,
                    wanted
                );
            }
        }
    }

    #[test]
    fn bridge_walks_off_equal_endpoints() {
        assert_eq!(bridge_count(3, 3, 5), 4);
        assert_eq!(bridge_count(2, 4, 5), 3);
        assert_eq!(bridge_count(5, 5, 5), 5);
    }
}
