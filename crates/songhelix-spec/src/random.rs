//! Numeric and string random templating.
//!
//! Any integer field of the document may be written as a plain number, a
//! uniform range, a normal distribution, or a list of candidates. String
//! fields may be written as a plain string or a list. Templated values are
//! resolved once, at load time, against the owning element's RNG.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::SpecError;

/// An integer field that may be templated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RandomValue {
    /// A fixed literal value.
    Fixed(i64),
    /// Uniform draw from `[min, max]`, or a normal draw when `type` is set.
    Range {
        min: i64,
        max: i64,
        #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
        kind: Option<RandomKind>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mean: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variance: Option<f64>,
    },
    /// Uniform draw from an explicit candidate list.
    List { list: Vec<i64> },
}

/// Distribution selector for ranged random values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RandomKind {
    Uniform,
    Normal,
}

impl RandomValue {
    /// Resolve the template to a concrete value.
    pub fn resolve<R: Rng>(&self, field: &str, rng: &mut R) -> Result<i64, SpecError> {
        match self {
            RandomValue::Fixed(v) => Ok(*v),
            RandomValue::Range {
                min,
                max,
                kind,
                mean,
                variance,
            } => {
                if min > max {
                    return Err(SpecError::InvalidRandomValue {
                        field: field.to_string(),
                        message: format!("min {} exceeds max {}", min, max),
                    });
                }
                match kind {
                    Some(RandomKind::Normal) => {
                        let mean = mean.unwrap_or((*min + *max) as f64 / 2.0);
                        let variance =
                            variance.ok_or_else(|| SpecError::InvalidRandomValue {
                                field: field.to_string(),
                                message: "normal distribution requires variance".to_string(),
                            })?;
                        if variance < 0.0 {
                            return Err(SpecError::InvalidRandomValue {
                                field: field.to_string(),
                                message: "variance must be non-negative".to_string(),
                            });
                        }
                        let drawn = (mean + gaussian(rng) * variance.sqrt()).round() as i64;
                        Ok(drawn.clamp(*min, *max))
                    }
                    _ => Ok(rng.gen_range(*min..=*max)),
                }
            }
            RandomValue::List { list } => {
                if list.is_empty() {
                    return Err(SpecError::InvalidRandomValue {
                        field: field.to_string(),
                        message: "candidate list is empty".to_string(),
                    });
                }
                Ok(list[rng.gen_range(0..list.len())])
            }
        }
    }
}

/// A string field that may be templated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RandomString {
    /// A fixed literal string.
    Fixed(String),
    /// Uniform draw from a candidate list.
    List { list: Vec<String> },
}

impl RandomString {
    /// Resolve the template to a concrete string.
    pub fn resolve<R: Rng>(&self, field: &str, rng: &mut R) -> Result<String, SpecError> {
        match self {
            RandomString::Fixed(s) => Ok(s.clone()),
            RandomString::List { list } => {
                if list.is_empty() {
                    return Err(SpecError::InvalidRandomValue {
                        field: field.to_string(),
                        message: "candidate list is empty".to_string(),
                    });
                }
                Ok(list[rng.gen_range(0..list.len())].clone())
            }
        }
    }
}

/// Standard normal sample via Box-Muller.
fn gaussian<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    #[test]
    fn fixed_passes_through() {
        let mut rng = Pcg32::seed_from_u64(1);
        assert_eq!(RandomValue::Fixed(7).resolve("f", &mut rng).unwrap(), 7);
    }

    #[test]
    fn uniform_stays_in_range() {
        let mut rng = Pcg32::seed_from_u64(1);
        let value = RandomValue::Range {
            min: 3,
            max: 9,
            kind: None,
            mean: None,
            variance: None,
        };
        for _ in 0..100 {
            let v = value.resolve("f", &mut rng).unwrap();
            assert!((3..=9).contains(&v));
        }
    }

    #[test]
    fn normal_clamps_to_range() {
        let mut rng = Pcg32::seed_from_u64(1);
        let value = RandomValue::Range {
            min: 0,
            max: 10,
            kind: Some(RandomKind::Normal),
            mean: Some(5.0),
            variance: Some(100.0),
        };
        for _ in 0..100 {
            let v = value.resolve("f", &mut rng).unwrap();
            assert!((0..=10).contains(&v));
        }
    }

    #[test]
    fn list_draws_members() {
        let mut rng = Pcg32::seed_from_u64(1);
        let value = RandomValue::List { list: vec![2, 4] };
        for _ in 0..20 {
            let v = value.resolve("f", &mut rng).unwrap();
            assert!(v == 2 || v == 4);
        }
    }

    #[test]
    fn untagged_forms_deserialize() {
        let fixed: RandomValue = serde_json::from_str("5").unwrap();
        assert_eq!(fixed, RandomValue::Fixed(5));
        let range: RandomValue = serde_json::from_str(r#"{"min":1,"max":4}"#).unwrap();
        assert!(matches!(range, RandomValue::Range { min: 1, max: 4, .. }));
        let list: RandomValue = serde_json::from_str(r#"{"list":[1,2]}"#).unwrap();
        assert!(matches!(list, RandomValue::List { .. }));
    }
}
