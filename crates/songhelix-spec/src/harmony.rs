//! Harmony engine configuration.

use serde::{Deserialize, Serialize};

/// Harmony engine selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HarmonySpec {
    /// Chord-pattern harmony: one pattern string is drawn uniformly from
    /// `chord_patterns` and expanded against the random tables.
    Pattern(ChordPatternSpec),
}

/// Configuration for the chord-pattern harmony engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordPatternSpec {
    /// Candidate chord pattern strings (one is drawn per song).
    pub chord_patterns: Vec<String>,
    /// Chord random tables, each a comma-separated list of chord names.
    #[serde(default)]
    pub chord_random_tables: Vec<String>,
    /// Pitch class at or above which named chords are dropped an octave.
    #[serde(default = "default_crossover_pitch")]
    pub crossover_pitch: i32,
    /// Post-process each chord toward the first chord's voicing.
    #[serde(default)]
    pub minimize_chord_distance: bool,
    /// Strip inversions of major/minor/diminished chords.
    #[serde(default)]
    pub normalize_chords: bool,
    /// Absolute seed override for this element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Seed salt for this element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<u32>,
}

/// Default crossover pitch (the pitch class of D#).
fn default_crossover_pitch() -> i32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_spec_deserializes_with_defaults() {
        let json = r#"{"type":"pattern","chord_patterns":["Am/4,F/4"]}"#;
        let spec: HarmonySpec = serde_json::from_str(json).unwrap();
        let HarmonySpec::Pattern(p) = spec;
        assert_eq!(p.chord_patterns, vec!["Am/4,F/4"]);
        assert_eq!(p.crossover_pitch, 3);
        assert!(!p.minimize_chord_distance);
        assert!(p.chord_random_tables.is_empty());
    }
}
