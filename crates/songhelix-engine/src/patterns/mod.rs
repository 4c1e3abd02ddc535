//! Pattern engines: produce [`Pattern`]s from configuration.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand_pcg::Pcg32;

use songhelix_spec::patterns::{
    CrescendoSpec, PatternEngineSpec, PatternSource, RandomFragmentSpec, RandomPatternSpec,
    WeightedChoice,
};
use songhelix_spec::random::RandomValue;

use crate::error::EngineError;
use crate::pattern::{Pattern, PatternEntry};

pub mod grammar;

pub use grammar::{euclidean_rhythm, parse_pattern, ParseOptions};

const MAX_UNIQUE_ATTEMPTS: u32 = 100;
const MAX_FRAGMENT_ATTEMPTS: u32 = 100;

/// Consumer-side parsing context for pattern engines.
#[derive(Debug, Clone, Copy)]
pub struct PatternContext<'a> {
    /// Wildcards the consumer resolves later.
    pub wildcards: &'a [char],
    /// Velocity for notes without an explicit one.
    pub max_velocity: u32,
}

impl PatternContext<'_> {
    fn parse_options(&self, ticks_per_beat: u32) -> ParseOptions {
        ParseOptions {
            wildcards: self.wildcards,
            default_velocity: self.max_velocity as i32,
            default_ticks_per_beat: ticks_per_beat,
        }
    }
}

/// Build a pattern from a source (literal shorthand or configured engine).
pub fn build_pattern(
    source: &PatternSource,
    ctx: &PatternContext,
    rng: &mut Pcg32,
) -> Result<Pattern, EngineError> {
    match source {
        PatternSource::Literal(pattern) => parse_pattern(pattern, &ctx.parse_options(4)),
        PatternSource::Engine(engine) => build_engine_pattern(engine, ctx, rng),
    }
}

fn build_engine_pattern(
    engine: &PatternEngineSpec,
    ctx: &PatternContext,
    rng: &mut Pcg32,
) -> Result<Pattern, EngineError> {
    match engine {
        PatternEngineSpec::String { pattern } => {
            parse_pattern(pattern, &ctx.parse_options(4))
        }
        PatternEngineSpec::Random(spec) => build_random(spec, ctx, rng),
        PatternEngineSpec::RandomFragment(spec) => build_random_fragment(spec, ctx, rng),
        PatternEngineSpec::Crescendo(spec) => build_crescendo(spec, ctx, rng),
    }
}

/// Weighted offset/velocity/length tables, one draw per entry.
fn build_random(
    spec: &RandomPatternSpec,
    ctx: &PatternContext,
    rng: &mut Pcg32,
) -> Result<Pattern, EngineError> {
    if spec.offsets.is_empty() {
        return Err(EngineError::SequencerConfig {
            message: "random pattern engine needs at least one offset".to_string(),
        });
    }
    if spec.notes_per_part == 0 || spec.parts == 0 {
        return Err(EngineError::SequencerConfig {
            message: "random pattern engine needs positive parts and notes_per_part".to_string(),
        });
    }
    let offsets = weighted_index(&spec.offsets)?;
    let lengths = if spec.lengths.is_empty() {
        None
    } else {
        Some(weighted_index(&spec.lengths)?)
    };
    let velocities = if spec.velocities.is_empty() {
        None
    } else {
        Some(weighted_index(&spec.velocities)?)
    };

    let generate_part = |rng: &mut Pcg32| -> Vec<PatternEntry> {
        (0..spec.notes_per_part)
            .map(|_| {
                let ticks = lengths
                    .as_ref()
                    .map(|(index, values)| values[index.sample(rng)] as u32)
                    .unwrap_or(1)
                    .max(1);
                if rng.gen_bool(spec.pause_probability.clamp(0.0, 1.0)) {
                    PatternEntry::Pause { ticks }
                } else {
                    let pitch = spec.offsets[offsets.0.sample(rng)].value as i32;
                    let velocity = velocities
                        .as_ref()
                        .map(|(index, values)| values[index.sample(rng)] as i32)
                        .unwrap_or(ctx.max_velocity as i32);
                    PatternEntry::Note {
                        pitch: Some(pitch),
                        wildcard: None,
                        velocity,
                        ticks,
                        legato: false,
                    }
                }
            })
            .collect()
    };

    for _ in 0..MAX_UNIQUE_ATTEMPTS {
        let parts: Vec<Vec<PatternEntry>> =
            (0..spec.parts).map(|_| generate_part(rng)).collect();
        if spec.unique_pattern_parts && spec.parts > 1 {
            let distinct = parts
                .iter()
                .enumerate()
                .all(|(i, a)| parts.iter().skip(i + 1).all(|b| a != b));
            if !distinct {
                continue;
            }
        }
        let entries: Vec<PatternEntry> = parts.into_iter().flatten().collect();
        return Ok(Pattern::new(entries, spec.ticks_per_beat));
    }
    Err(EngineError::SequencerConfig {
        message: format!(
            "could not generate {} distinct pattern parts in {} attempts",
            spec.parts, MAX_UNIQUE_ATTEMPTS
        ),
    })
}

type WeightedTable = (WeightedIndex<f64>, Vec<i64>);

fn weighted_index(choices: &[WeightedChoice]) -> Result<WeightedTable, EngineError> {
    let weights: Vec<f64> = choices.iter().map(|c| c.weight).collect();
    let values: Vec<i64> = choices.iter().map(|c| c.value).collect();
    let index = WeightedIndex::new(weights).map_err(|e| EngineError::SequencerConfig {
        message: format!("invalid weights: {}", e),
    })?;
    Ok((index, values))
}

/// Concatenate random fragments to exactly the target tick count.
fn build_random_fragment(
    spec: &RandomFragmentSpec,
    ctx: &PatternContext,
    rng: &mut Pcg32,
) -> Result<Pattern, EngineError> {
    if spec.fragments.is_empty() {
        return Err(EngineError::SequencerConfig {
            message: "random fragment engine needs at least one fragment".to_string(),
        });
    }
    let options = ctx.parse_options(spec.ticks_per_beat);
    let fragments: Vec<Pattern> = spec
        .fragments
        .iter()
        .map(|f| parse_pattern(f, &options))
        .collect::<Result<_, _>>()?;

    for _ in 0..MAX_FRAGMENT_ATTEMPTS {
        let mut entries = Vec::new();
        let mut total = 0u32;
        while total < spec.target_ticks {
            let fragment = &fragments[rng.gen_range(0..fragments.len())];
            total += fragment.total_ticks();
            entries.extend_from_slice(fragment.entries());
        }
        if total == spec.target_ticks {
            return Ok(Pattern::new(entries, spec.ticks_per_beat));
        }
    }
    Err(EngineError::PatternLength {
        target: spec.target_ticks,
        attempts: MAX_FRAGMENT_ATTEMPTS,
    })
}

/// Repeat a base pattern with per-repetition velocity interpolation.
fn build_crescendo(
    spec: &CrescendoSpec,
    ctx: &PatternContext,
    rng: &mut Pcg32,
) -> Result<Pattern, EngineError> {
    if spec.count == 0 {
        return Err(EngineError::SequencerConfig {
            message: "crescendo engine needs a positive repeat count".to_string(),
        });
    }
    let base = parse_pattern(&spec.pattern, &ctx.parse_options(4))?;
    let start = resolve_velocity(&spec.start_velocity, "start_velocity", rng)?;
    let end = resolve_velocity(&spec.end_velocity, "end_velocity", rng)?;

    let mut entries = Vec::with_capacity(base.len() * spec.count as usize);
    for repetition in 0..spec.count {
        let target = if spec.count == 1 {
            start
        } else {
            start + (end - start) * repetition as f64 / (spec.count - 1) as f64
        };
        let factor = target / ctx.max_velocity as f64;
        for entry in base.entries() {
            entries.push(match *entry {
                PatternEntry::Note {
                    pitch,
                    wildcard,
                    velocity,
                    ticks,
                    legato,
                } => PatternEntry::Note {
                    pitch,
                    wildcard,
                    velocity: ((velocity as f64 * factor).round() as i32)
                        .clamp(0, ctx.max_velocity as i32),
                    ticks,
                    legato,
                },
                pause => pause,
            });
        }
    }
    Ok(Pattern::new(entries, base.ticks_per_beat()))
}

fn resolve_velocity(
    value: &RandomValue,
    field: &str,
    rng: &mut Pcg32,
) -> Result<f64, EngineError> {
    Ok(value.resolve(field, rng)? as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;

    fn ctx() -> PatternContext<'static> {
        PatternContext {
            wildcards: &[],
            max_velocity: 32767,
        }
    }

    fn choices(values: &[i64]) -> Vec<WeightedChoice> {
        values
            .iter()
            .map(|&value| WeightedChoice { value, weight: 1.0 })
            .collect()
    }

    #[test]
    fn literal_source_parses() {
        let mut rng = Pcg32::seed_from_u64(1);
        let p = build_pattern(
            &PatternSource::Literal("0/2,1/2".to_string()),
            &ctx(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(p.total_ticks(), 4);
    }

    #[test]
    fn random_engine_draws_from_tables() {
        let spec = RandomPatternSpec {
            parts: 2,
            notes_per_part: 8,
            offsets: choices(&[0, 2, 4]),
            lengths: choices(&[1, 2]),
            velocities: choices(&[10000, 20000]),
            pause_probability: 0.25,
            unique_pattern_parts: false,
            ticks_per_beat: 4,
            seed: None,
            salt: None,
        };
        let mut rng = Pcg32::seed_from_u64(7);
        let p = build_random(&spec, &ctx(), &mut rng).unwrap();
        assert_eq!(p.len(), 16);
        for entry in p.entries() {
            match *entry {
                PatternEntry::Note {
                    pitch: Some(pitch),
                    velocity,
                    ticks,
                    ..
                } => {
                    assert!([0, 2, 4].contains(&pitch));
                    assert!(velocity == 10000 || velocity == 20000);
                    assert!(ticks == 1 || ticks == 2);
                }
                PatternEntry::Pause { ticks } => assert!(ticks == 1 || ticks == 2),
                ref other => panic!("unexpected entry {:?}", other),
            }
        }
    }

    #[test]
    fn random_engine_unique_parts_are_distinct() {
        let spec = RandomPatternSpec {
            parts: 3,
            notes_per_part: 4,
            offsets: choices(&[0, 1, 2, 3, 4, 5, 6, 7]),
            lengths: Vec::new(),
            velocities: Vec::new(),
            pause_probability: 0.0,
            unique_pattern_parts: true,
            ticks_per_beat: 4,
            seed: None,
            salt: None,
        };
        let mut rng = Pcg32::seed_from_u64(3);
        let p = build_random(&spec, &ctx(), &mut rng).unwrap();
        let parts: Vec<&[PatternEntry]> = p.entries().chunks(4).collect();
        assert_ne!(parts[0], parts[1]);
        assert_ne!(parts[1], parts[2]);
        assert_ne!(parts[0], parts[2]);
    }

    #[test]
    fn fragment_engine_hits_exact_target() {
        let spec = RandomFragmentSpec {
            fragments: vec!["0/2".to_string(), "1/2,2/2".to_string()],
            target_ticks: 16,
            ticks_per_beat: 4,
            seed: None,
            salt: None,
        };
        let mut rng = Pcg32::seed_from_u64(1);
        let p = build_random_fragment(&spec, &ctx(), &mut rng).unwrap();
        assert_eq!(p.total_ticks(), 16);
    }

    #[test]
    fn fragment_engine_fails_on_impossible_target() {
        let spec = RandomFragmentSpec {
            fragments: vec!["0/2".to_string()],
            target_ticks: 5,
            ticks_per_beat: 4,
            seed: None,
            salt: None,
        };
        let mut rng = Pcg32::seed_from_u64(1);
        assert!(matches!(
            build_random_fragment(&spec, &ctx(), &mut rng),
            Err(EngineError::PatternLength { .. })
        ));
    }

    #[test]
    fn crescendo_interpolates_velocity() {
        let spec = CrescendoSpec {
            pattern: "0/1".to_string(),
            count: 4,
            start_velocity: RandomValue::Fixed(0),
            end_velocity: RandomValue::Fixed(32767),
            seed: None,
            salt: None,
        };
        let mut rng = Pcg32::seed_from_u64(1);
        let p = build_crescendo(&spec, &ctx(), &mut rng).unwrap();
        let velocities: Vec<i32> = p
            .entries()
            .iter()
            .map(|e| match e {
                PatternEntry::Note { velocity, .. } => *velocity,
                other => panic!("unexpected entry {:?}", other),
            })
            .collect();
        assert_eq!(velocities.first(), Some(&0));
        assert_eq!(velocities.last(), Some(&32767));
        assert!(velocities.windows(2).all(|w| w[0] <= w[1]));
    }
}
