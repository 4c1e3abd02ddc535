//! Sequence engine configuration.

use serde::{Deserialize, Serialize};

use crate::patterns::PatternSource;

/// Sequence engine selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SequenceEngineSpec {
    /// Per chord, play the shortest pattern covering the chord run.
    Arpeggio(ArpeggioSpec),
    /// Play each chord as sustained polyphony.
    Pad(PadSpec),
    /// Generate one melody per distinct chord section.
    Melody(MelodySpec),
    /// Play a fixed pattern with chord-tone offset resolution.
    Pattern(PatternSeqSpec),
    /// Multi-voice drum machine with conditional rewrite rules.
    Drum(DrumSpec),
}

/// When the pattern read cursor resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternRestartMode {
    /// Never reset; the cursor wraps over the pattern length.
    #[default]
    Never,
    /// Reset at every chord section boundary.
    ChordSection,
    /// Reset at every chord change.
    Chord,
}

/// Configuration for the arpeggio engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArpeggioSpec {
    /// Candidate patterns; per chord the shortest one covering the chord
    /// run is chosen, falling back to the longest available.
    pub patterns: Vec<PatternSource>,
    #[serde(default)]
    pub pattern_restart_mode: PatternRestartMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<u32>,
}

/// Configuration for the pad engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PadSpec {
    /// Chord offsets voiced simultaneously (0 = low pitch, 1 = middle, ...).
    pub offsets: Vec<i32>,
    /// Velocity of emitted notes.
    #[serde(default = "default_velocity")]
    pub velocity: i64,
    /// Re-strike unchanged pitches on chord changes.
    #[serde(default = "default_true")]
    pub retrigger_pitches: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<u32>,
}

/// Configuration for the melody engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MelodySpec {
    /// Rhythm patterns with pitch wildcards (`+`, `#`, `*`).
    pub patterns: Vec<PatternSource>,
    /// Candidate intervals for free pitches, in semitones.
    #[serde(default = "default_pitch_distances")]
    pub pitch_distances: Vec<i32>,
    /// Lowest admissible pitch.
    #[serde(default = "default_min_pitch")]
    pub min_pitch: i32,
    /// Highest admissible pitch.
    #[serde(default = "default_max_pitch")]
    pub max_pitch: i32,
    /// Number of alternative melodies generated per distinct section,
    /// cycled round-robin across occurrences.
    #[serde(default = "default_one")]
    pub melodies: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<u32>,
}

/// Configuration for the pattern engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSeqSpec {
    /// Patterns whose offsets resolve as chord-tone indices.
    pub patterns: Vec<PatternSource>,
    #[serde(default)]
    pub pattern_restart_mode: PatternRestartMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<u32>,
}

/// Configuration for the drum engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrumSpec {
    /// One voice per (pattern, pitch, activity vector) triple.
    pub voices: Vec<DrumVoiceSpec>,
    /// Conditional rewrite rules evaluated at chord section boundaries.
    #[serde(default)]
    pub conditional_patterns: Vec<ConditionalPatternSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<u32>,
}

/// One drum voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrumVoiceSpec {
    pub pattern: PatternSource,
    /// Fixed pitch for this voice (pattern offsets are ignored for pitch).
    pub pitch: i32,
    /// Activity vector gating this voice.
    pub activity_vector: String,
}

/// A conditional drum rewrite rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalPatternSpec {
    /// Boolean expression over vector states at the previous boundary.
    pub precondition: String,
    /// Boolean expression over vector states at the current boundary.
    pub postcondition: String,
    /// Replacement pattern written into the ticks before the boundary.
    pub pattern: String,
    /// Application probability in [0, 1].
    #[serde(default = "default_probability")]
    pub probability: f64,
    /// Whether notes merge over or replace the target window.
    #[serde(default)]
    pub mode: ConditionalMode,
    /// Rule-cursor offset after an application (may be negative).
    #[serde(default)]
    pub skip_when_applied: i64,
    /// Rule-cursor offset after a non-application (may be negative).
    #[serde(default)]
    pub skip_when_not_applied: i64,
    /// Indices of the drum voices the rule rewrites.
    pub targets: Vec<usize>,
}

/// Conditional rule write mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionalMode {
    /// Override only ticks where the rule pattern has a note.
    #[default]
    Add,
    /// Overwrite the whole window.
    Replace,
}

fn default_velocity() -> i64 {
    32767
}

fn default_true() -> bool {
    true
}

fn default_one() -> u32 {
    1
}

fn default_probability() -> f64 {
    1.0
}

fn default_pitch_distances() -> Vec<i32> {
    vec![-2, -1, 1, 2]
}

fn default_min_pitch() -> i32 {
    -3
}

fn default_max_pitch() -> i32 {
    12
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drum_spec_deserializes() {
        let json = r#"{
            "type": "drum",
            "voices": [
                {"pattern": "0/1,-/1", "pitch": 36, "activity_vector": "kick"}
            ],
            "conditional_patterns": [
                {"precondition": "!snare", "postcondition": "snare",
                 "pattern": "0:20000/1", "probability": 0.5,
                 "mode": "replace", "targets": [0]}
            ]
        }"#;
        let spec: SequenceEngineSpec = serde_json::from_str(json).unwrap();
        let SequenceEngineSpec::Drum(drum) = spec else {
            panic!("wrong engine");
        };
        assert_eq!(drum.voices.len(), 1);
        assert_eq!(drum.conditional_patterns[0].mode, ConditionalMode::Replace);
        assert_eq!(drum.conditional_patterns[0].skip_when_applied, 0);
    }
}
