//! Pattern engine configuration.

use serde::{Deserialize, Serialize};

use crate::random::RandomValue;

/// A pattern source: either a literal pattern string or a configured engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternSource {
    /// Shorthand for the string engine.
    Literal(String),
    /// Full engine configuration.
    Engine(PatternEngineSpec),
}

/// Pattern engine selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternEngineSpec {
    /// Parse a literal pattern string.
    String {
        pattern: String,
    },
    /// Generate entries from weighted offset/velocity/length tables.
    Random(RandomPatternSpec),
    /// Concatenate fragments to an exact target length.
    RandomFragment(RandomFragmentSpec),
    /// Repeat a base pattern with linearly interpolated velocity.
    Crescendo(CrescendoSpec),
}

/// Configuration for the random pattern engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomPatternSpec {
    /// Number of pattern parts to generate.
    #[serde(default = "default_one")]
    pub parts: u32,
    /// Entries per part.
    pub notes_per_part: u32,
    /// Weighted pitch offsets.
    pub offsets: Vec<WeightedChoice>,
    /// Weighted note lengths in ticks.
    #[serde(default)]
    pub lengths: Vec<WeightedChoice>,
    /// Weighted velocities.
    #[serde(default)]
    pub velocities: Vec<WeightedChoice>,
    /// Probability that an entry is a pause instead of a note.
    #[serde(default)]
    pub pause_probability: f64,
    /// Regenerate until all parts are pairwise distinct.
    #[serde(default)]
    pub unique_pattern_parts: bool,
    /// Ticks per beat of the produced pattern.
    #[serde(default = "default_ticks_per_beat")]
    pub ticks_per_beat: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<u32>,
}

/// Configuration for the random fragment engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomFragmentSpec {
    /// Fragment pattern strings to concatenate.
    pub fragments: Vec<String>,
    /// Target length in ticks.
    pub target_ticks: u32,
    /// Ticks per beat of the produced pattern.
    #[serde(default = "default_ticks_per_beat")]
    pub ticks_per_beat: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<u32>,
}

/// Configuration for the crescendo engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrescendoSpec {
    /// Base pattern string.
    pub pattern: String,
    /// Number of repetitions.
    pub count: u32,
    /// Velocity at the first repetition.
    pub start_velocity: RandomValue,
    /// Velocity at the last repetition.
    pub end_velocity: RandomValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<u32>,
}

/// A weighted candidate value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedChoice {
    pub value: i64,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_one() -> u32 {
    1
}

fn default_ticks_per_beat() -> u32 {
    4
}

fn default_weight() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_shorthand_deserializes() {
        let src: PatternSource = serde_json::from_str(r#""0/2,1/2""#).unwrap();
        assert_eq!(src, PatternSource::Literal("0/2,1/2".to_string()));
    }

    #[test]
    fn tagged_engine_deserializes() {
        let json = r#"{"type":"crescendo","pattern":"0/1","count":4,"start_velocity":1000,"end_velocity":30000}"#;
        let src: PatternSource = serde_json::from_str(json).unwrap();
        assert!(matches!(
            src,
            PatternSource::Engine(PatternEngineSpec::Crescendo(_))
        ));
    }
}
