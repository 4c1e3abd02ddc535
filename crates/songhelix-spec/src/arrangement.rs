//! Arrangement engine configuration: activity solver, voices, and tracks.

use serde::{Deserialize, Serialize};

use crate::random::RandomValue;
use crate::sequencers::SequenceEngineSpec;

/// Configuration for the arrangement engine (activity solver + tracks).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrangementSpec {
    /// Solver strategy.
    #[serde(default)]
    pub constraint_mode: ConstraintMode,
    /// Global iteration budget for the solver.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,
    /// Wanted activity counts for the fade-in sections.
    #[serde(default)]
    pub start_activity_counts: Vec<u32>,
    /// Wanted activity counts for the fade-out sections.
    #[serde(default)]
    pub stop_activity_counts: Vec<u32>,
    /// Lower bound on middle-phase activity counts.
    #[serde(default)]
    pub min_activity_count: u32,
    /// Upper bound on activity counts; 0 selects the exponential cap.
    #[serde(default)]
    pub max_activity_count: u32,
    /// Maximum |delta| between consecutive middle-phase counts.
    #[serde(default = "default_max_change")]
    pub max_activity_change_count: u32,
    /// Score weights for greedy mode.
    #[serde(default)]
    pub greedy_weights: GreedyWeights,
    /// One configuration per named voice.
    pub activity_vectors: Vec<ActivityVectorSpec>,
    /// Post-solve activity modification operators.
    #[serde(default)]
    pub modifiers: Vec<ActivityModifierSpec>,
    /// Instrument tracks rendered from the solved matrix.
    pub tracks: Vec<TrackSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<u32>,
}

/// Solver strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintMode {
    /// Randomized backtracking; every constraint holds on success.
    #[default]
    Exact,
    /// Scored random draw per section; approximate satisfaction.
    Greedy,
}

/// Score weights for greedy mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreedyWeights {
    /// Weight per segment/pause length violation.
    pub length: u32,
    /// Weight per segment count violation.
    pub segment_count: u32,
    /// Weight per start/stop window violation.
    pub window: u32,
    /// Weight per percentage point of min/max activity violation.
    pub activity: u32,
}

impl Default for GreedyWeights {
    fn default() -> Self {
        GreedyWeights {
            length: 250,
            segment_count: 400,
            window: 100,
            activity: 15,
        }
    }
}

/// Per-voice constraints for the activity solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityVectorSpec {
    /// Voice name, referenced by tracks and modifiers.
    pub name: String,
    /// Minimum active percentage of song ticks.
    #[serde(default)]
    pub min_active: f64,
    /// Maximum active percentage of song ticks.
    #[serde(default = "default_max_active")]
    pub max_active: f64,
    /// Permit the voice to stay entirely inactive.
    #[serde(default)]
    pub allow_inactive: bool,
    /// Latest section (0-based) by which the voice must have started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_before_section: Option<u32>,
    /// Sections from the start during which the voice must stay inactive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_after_section: Option<u32>,
    /// Sections from the end during which the voice must stay inactive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_before_section: Option<u32>,
    /// Earliest section from the end at which the voice must still be active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_after_section: Option<u32>,
    /// Minimum number of active segments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_segment_count: Option<u32>,
    /// Maximum number of active segments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_segment_count: Option<u32>,
    /// Minimum active segment length in sections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_segment_length: Option<u32>,
    /// Maximum active segment length in sections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_segment_length: Option<u32>,
    /// Minimum pause length in sections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_pause_length: Option<u32>,
    /// Maximum pause length in sections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pause_length: Option<u32>,
    /// Tick shift applied to segment starts after the solve.
    #[serde(default)]
    pub start_shift: i64,
    /// Tick shift applied to segment stops after the solve.
    #[serde(default)]
    pub stop_shift: i64,
}

/// A section reference: absolute index, negative index from the end, or a
/// percentage of total ticks mapped to the containing section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectionRef {
    Index(i64),
    Percent(String),
}

/// Post-solve activity modification operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ActivityModifierSpec {
    /// Set the target active over the range.
    Set {
        target: String,
        from: SectionRef,
        to: SectionRef,
    },
    /// Clear the target over the range.
    Clear {
        target: String,
        from: SectionRef,
        to: SectionRef,
    },
    /// Flip the target over the range.
    Flip {
        target: String,
        from: SectionRef,
        to: SectionRef,
    },
    /// target = !a over the range.
    Not {
        target: String,
        a: String,
        from: SectionRef,
        to: SectionRef,
    },
    /// target = a & b over the range.
    And {
        target: String,
        a: String,
        b: String,
        from: SectionRef,
        to: SectionRef,
    },
    /// target = a | b over the range.
    Or {
        target: String,
        a: String,
        b: String,
        from: SectionRef,
        to: SectionRef,
    },
    /// target = a ^ b over the range.
    Xor {
        target: String,
        a: String,
        b: String,
        from: SectionRef,
        to: SectionRef,
    },
    /// target = a & !b over the range.
    AndNot {
        target: String,
        a: String,
        b: String,
        from: SectionRef,
        to: SectionRef,
    },
}

impl ActivityModifierSpec {
    /// Name of the vector the operator writes to.
    pub fn target(&self) -> &str {
        match self {
            ActivityModifierSpec::Set { target, .. }
            | ActivityModifierSpec::Clear { target, .. }
            | ActivityModifierSpec::Flip { target, .. }
            | ActivityModifierSpec::Not { target, .. }
            | ActivityModifierSpec::And { target, .. }
            | ActivityModifierSpec::Or { target, .. }
            | ActivityModifierSpec::Xor { target, .. }
            | ActivityModifierSpec::AndNot { target, .. } => target,
        }
    }
}

/// One instrument track of the arrangement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSpec {
    /// Instrument name, bound to a device channel by the player.
    pub instrument: String,
    /// Melodic tracks honor the player transposition; rhythm tracks do not.
    #[serde(default)]
    pub kind: TrackKindSpec,
    /// Per-track pitch offset in semitones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transposition: Option<RandomValue>,
    /// Per-track velocity scale in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<RandomValue>,
    /// Render only this track (and other solo tracks).
    #[serde(default)]
    pub solo: bool,
    /// Skip this track entirely.
    #[serde(default)]
    pub mute: bool,
    /// Activity vector names consumed by the sequence engine.
    pub activity_vectors: Vec<String>,
    /// The sequence engine producing this track's notes.
    pub sequence_engine: SequenceEngineSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<u32>,
}

/// Track kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKindSpec {
    #[default]
    Melodic,
    Rhythm,
}

fn default_max_iterations() -> u64 {
    1_000_000
}

fn default_max_change() -> u32 {
    2
}

fn default_max_active() -> f64 {
    100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greedy_weights_default_to_reference_values() {
        let w = GreedyWeights::default();
        assert_eq!(w.length, 250);
        assert_eq!(w.segment_count, 400);
        assert_eq!(w.window, 100);
        assert_eq!(w.activity, 15);
    }

    #[test]
    fn modifier_deserializes_with_percent_ref() {
        let json = r#"{"op":"and_not","target":"a","a":"b","b":"c","from":0,"to":"50%"}"#;
        let spec: ActivityModifierSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.target(), "a");
        match spec {
            ActivityModifierSpec::AndNot { from, to, .. } => {
                assert_eq!(from, SectionRef::Index(0));
                assert_eq!(to, SectionRef::Percent("50%".to_string()));
            }
            _ => panic!("wrong op"),
        }
    }
}
