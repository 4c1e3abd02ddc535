//! Tests for the activity solver.

use rand::SeedableRng;
use rand_pcg::Pcg32;

use songhelix_spec::arrangement::{
    ActivityModifierSpec, ActivityVectorSpec, ArrangementSpec, ConstraintMode, GreedyWeights,
    SectionRef,
};

use crate::chord::Chord;
use crate::harmony::Harmony;

use super::{activity_cap, solve};

/// A harmony of `sections` sections, `ticks` ticks each, alternating chords.
fn harmony(sections: usize, ticks: usize) -> Harmony {
    let am = Chord::from_name("Am", 12).unwrap();
    let c = Chord::from_name("C", 12).unwrap();
    let timeline: Vec<(Chord, usize, bool)> = (0..sections)
        .map(|s| (if s % 2 == 0 { am } else { c }, ticks, true))
        .collect();
    Harmony::from_timeline(&timeline, sections * ticks).unwrap()
}

fn voice(name: &str) -> ActivityVectorSpec {
    ActivityVectorSpec {
        name: name.to_string(),
        min_active: 0.0,
        max_active: 100.0,
        allow_inactive: false,
        start_before_section: None,
        start_after_section: None,
        stop_before_section: None,
        stop_after_section: None,
        min_segment_count: None,
        max_segment_count: None,
        min_segment_length: None,
        max_segment_length: None,
        min_pause_length: None,
        max_pause_length: None,
        start_shift: 0,
        stop_shift: 0,
    }
}

fn arrangement(voices: Vec<ActivityVectorSpec>) -> ArrangementSpec {
    ArrangementSpec {
        constraint_mode: ConstraintMode::Exact,
        max_iterations: 100_000,
        start_activity_counts: vec![1, 2, 3],
        stop_activity_counts: vec![3, 2, 1],
        min_activity_count: 1,
        max_activity_count: 0,
        max_activity_change_count: 2,
        greedy_weights: GreedyWeights::default(),
        activity_vectors: voices,
        modifiers: Vec::new(),
        tracks: Vec::new(),
        seed: None,
        salt: None,
    }
}

/// Active sections of a vector, given equal section lengths.
fn active_sections(vector: &crate::activity::ActivityVector, ticks: usize) -> Vec<bool> {
    (0..vector.len() / ticks)
        .map(|s| vector.is_active(s * ticks))
        .collect()
}

#[test]
fn exact_satisfies_windowed_and_fragmented_voices() {
    // 8 sections, 3 voices: v1 always active, v2 windowed, v3 fragmented.
    let mut v1 = voice("v1");
    v1.min_active = 100.0;
    let mut v2 = voice("v2");
    v2.start_after_section = Some(1);
    v2.stop_before_section = Some(1);
    let mut v3 = voice("v3");
    v3.min_segment_count = Some(2);
    v3.max_segment_length = Some(2);
    let spec = arrangement(vec![v1, v2, v3]);
    let h = harmony(8, 16);

    for seed in 0..10 {
        let mut rng = Pcg32::seed_from_u64(seed);
        let matrix = solve(&spec, &h, &mut rng).unwrap();

        let v1 = matrix.get("v1").unwrap();
        assert_eq!(v1.active_ticks(), 128, "v1 must play everywhere");

        let v2 = matrix.get("v2").unwrap();
        let sections = active_sections(v2, 16);
        assert!(!sections[0], "v2 must not play in section 0");
        assert!(!sections[7], "v2 must not play in section 7");

        let v3 = matrix.get("v3").unwrap();
        assert!(v3.segment_count() >= 2);
        for (start, end) in v3.segments() {
            assert!(end - start <= 32, "v3 segments span at most 2 sections");
        }
    }
}

#[test]
fn exact_honors_activity_bounds() {
    let mut v1 = voice("v1");
    v1.min_active = 40.0;
    v1.max_active = 80.0;
    let v2 = voice("v2");
    let v3 = voice("v3");
    let spec = arrangement(vec![v1, v2, v3]);
    let h = harmony(12, 8);
    let total = 12 * 8;

    for seed in 0..10 {
        let mut rng = Pcg32::seed_from_u64(seed);
        let matrix = solve(&spec, &h, &mut rng).unwrap();
        let active = matrix.get("v1").unwrap().active_ticks();
        let pct = 100.0 * active as f64 / total as f64;
        assert!((40.0..=80.0).contains(&pct), "v1 at {}%", pct);
    }
}

#[test]
fn exact_honors_segment_and_pause_lengths() {
    let mut v1 = voice("v1");
    v1.min_segment_length = Some(2);
    v1.max_segment_length = Some(3);
    v1.min_pause_length = Some(2);
    let v2 = voice("v2");
    let v3 = voice("v3");
    let v4 = voice("v4");
    let spec = arrangement(vec![v1, v2, v3, v4]);
    let h = harmony(12, 8);

    for seed in 0..10 {
        let mut rng = Pcg32::seed_from_u64(seed);
        let matrix = solve(&spec, &h, &mut rng).unwrap();
        let v1 = matrix.get("v1").unwrap();
        let segments = v1.segments();
        for (start, end) in &segments {
            let sections = (end - start) / 8;
            assert!((2..=3).contains(&sections), "segment of {} sections", sections);
        }
        for pair in segments.windows(2) {
            let pause = (pair[1].0 - pair[0].1) / 8;
            assert!(pause >= 2, "pause of {} sections", pause);
        }
    }
}

#[test]
fn exact_reports_unsatisfiable_constraints() {
    // min_segment_count 4 with max_segment_count 1 cannot be satisfied.
    let mut v1 = voice("v1");
    v1.min_segment_count = Some(4);
    v1.max_segment_count = Some(1);
    let mut spec = arrangement(vec![v1, voice("v2")]);
    spec.max_iterations = 2_000;
    let h = harmony(8, 8);
    let mut rng = Pcg32::seed_from_u64(1);
    match solve(&spec, &h, &mut rng) {
        Err(crate::error::EngineError::ConstraintUnsatisfiable { failures, .. }) => {
            assert!(!failures.is_empty());
        }
        other => panic!("expected unsatisfiable, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn greedy_produces_a_full_matrix() {
    let mut spec = arrangement(vec![voice("v1"), voice("v2"), voice("v3")]);
    spec.constraint_mode = ConstraintMode::Greedy;
    spec.max_iterations = 64;
    let h = harmony(10, 8);
    let mut rng = Pcg32::seed_from_u64(5);
    let matrix = solve(&spec, &h, &mut rng).unwrap();
    assert_eq!(matrix.len(), 3);
    for (_, vector) in matrix.vectors() {
        assert_eq!(vector.len(), 80);
    }
}

#[test]
fn greedy_prefers_window_constraints() {
    let mut v1 = voice("v1");
    v1.start_after_section = Some(2);
    let mut spec = arrangement(vec![v1, voice("v2"), voice("v3")]);
    spec.constraint_mode = ConstraintMode::Greedy;
    spec.max_iterations = 128;
    let h = harmony(10, 8);
    for seed in 0..5 {
        let mut rng = Pcg32::seed_from_u64(seed);
        let matrix = solve(&spec, &h, &mut rng).unwrap();
        let v1 = matrix.get("v1").unwrap();
        assert!(!v1.is_active(0), "greedy should keep v1 out of section 0");
    }
}

#[test]
fn shifts_move_segment_boundaries() {
    let mut v1 = voice("v1");
    v1.min_active = 100.0;
    v1.start_shift = 4;
    v1.stop_shift = -4;
    let spec = arrangement(vec![v1, voice("v2")]);
    let h = harmony(8, 16);
    let mut rng = Pcg32::seed_from_u64(1);
    let matrix = solve(&spec, &h, &mut rng).unwrap();
    let v1 = matrix.get("v1").unwrap();
    assert_eq!(v1.segments(), vec![(4, 124)]);
}

#[test]
fn modifiers_rewrite_the_matrix() {
    let mut v1 = voice("v1");
    v1.min_active = 100.0;
    let mut v2 = voice("v2");
    v2.min_active = 100.0;
    let mut spec = arrangement(vec![v1, v2]);
    spec.max_activity_count = 2;
    spec.start_activity_counts = vec![2];
    spec.stop_activity_counts = vec![2];
    spec.min_activity_count = 2;
    spec.modifiers = vec![ActivityModifierSpec::AndNot {
        target: "v1".to_string(),
        a: "v1".to_string(),
        b: "v2".to_string(),
        from: SectionRef::Index(0),
        to: SectionRef::Index(-1),
    }];
    let h = harmony(4, 8);
    let mut rng = Pcg32::seed_from_u64(1);
    let matrix = solve(&spec, &h, &mut rng).unwrap();
    // v2 is active everywhere, so v1 & !v2 clears v1 completely.
    assert_eq!(matrix.get("v1").unwrap().active_ticks(), 0);
    assert_eq!(matrix.get("v2").unwrap().active_ticks(), 32);
}

#[test]
fn percent_references_map_to_sections() {
    let mut v1 = voice("v1");
    v1.min_active = 100.0;
    let mut spec = arrangement(vec![v1, voice("v2")]);
    spec.modifiers = vec![ActivityModifierSpec::Clear {
        target: "v1".to_string(),
        from: SectionRef::Percent("50%".to_string()),
        to: SectionRef::Index(-1),
    }];
    let h = harmony(4, 8);
    let mut rng = Pcg32::seed_from_u64(1);
    let matrix = solve(&spec, &h, &mut rng).unwrap();
    // Tick 16 lies in section 2; sections 2 and 3 are cleared.
    assert_eq!(matrix.get("v1").unwrap().segments(), vec![(0, 16)]);
}

#[test]
fn cap_follows_the_exponential_curve() {
    let spec = arrangement(vec![voice("v1")]);
    assert_eq!(activity_cap(&spec, 1), 1);
    // N = 10: 10 * (0.4 + 0.6 * e^(-1.8)) ~= 5.0.
    assert_eq!(activity_cap(&spec, 10), 5);
    let mut fixed = arrangement(vec![voice("v1")]);
    fixed.max_activity_count = 3;
    assert_eq!(activity_cap(&fixed, 10), 3);
    assert_eq!(activity_cap(&fixed, 2), 2);
}
