//! The root song document.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::arrangement::ArrangementSpec;
use crate::error::SpecError;
use crate::harmony::HarmonySpec;
use crate::player::PlayerSpec;
use crate::random::{RandomString, RandomValue};
use crate::version;

/// The root document binding structure, harmony, arrangement, and player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongDocument {
    /// Accepted document versions (comma list of `x`, `x+`, `x1-x2`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Song name; drawn from a list when templated, otherwise derived from
    /// the seed at generation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song_name: Option<RandomString>,
    /// Root seed; the CLI may override it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Song structure.
    pub structure: StructureSpec,
    /// Harmony engine.
    pub harmony: HarmonySpec,
    /// Arrangement engine (activity solver + tracks).
    pub arrangement: ArrangementSpec,
    /// Player.
    pub player: PlayerSpec,
}

/// Song structure: temporal grid and velocity resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureSpec {
    /// Number of bars.
    pub bars: RandomValue,
    /// Beats per bar.
    #[serde(default = "default_beats_per_bar")]
    pub beats_per_bar: u32,
    /// Ticks per beat.
    #[serde(default = "default_ticks_per_beat")]
    pub ticks_per_beat: u32,
    /// Maximum internal velocity, mapped onto MIDI 0-127.
    #[serde(default = "default_max_velocity")]
    pub max_velocity: u32,
}

impl SongDocument {
    /// Parse a document from a JSON string.
    pub fn from_str(input: &str) -> Result<Self, SpecError> {
        let doc: SongDocument = serde_json::from_str(input)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Load and parse a document from a file.
    pub fn from_path(path: &Path) -> Result<Self, SpecError> {
        let input = std::fs::read_to_string(path).map_err(|source| SpecError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&input)
    }

    /// Validate cross-references and the version gate.
    pub fn validate(&self) -> Result<(), SpecError> {
        if let Some(spec) = &self.version {
            version::check_version(spec)?;
        }
        if self.structure.beats_per_bar == 0 {
            return Err(SpecError::NonPositiveStructure {
                field: "beats_per_bar",
            });
        }
        if self.structure.ticks_per_beat == 0 {
            return Err(SpecError::NonPositiveStructure {
                field: "ticks_per_beat",
            });
        }
        if self.arrangement.tracks.is_empty() {
            return Err(SpecError::NoTracks);
        }

        let mut names = HashSet::new();
        for vector in &self.arrangement.activity_vectors {
            if !names.insert(vector.name.as_str()) {
                return Err(SpecError::DuplicateActivityVector {
                    name: vector.name.clone(),
                });
            }
        }
        for track in &self.arrangement.tracks {
            for name in &track.activity_vectors {
                if !names.contains(name.as_str()) {
                    return Err(SpecError::UnknownActivityVector {
                        track: track.instrument.clone(),
                        name: name.clone(),
                    });
                }
            }
        }

        let PlayerSpec::Midi(midi) = &self.player;
        let device_names: HashSet<&str> =
            midi.devices.iter().map(|d| d.name.as_str()).collect();
        for track in &self.arrangement.tracks {
            if track.mute {
                continue;
            }
            let Some(binding) = midi.instruments.get(&track.instrument) else {
                return Err(SpecError::MissingInstrumentMapping {
                    instrument: track.instrument.clone(),
                });
            };
            if binding.channel > 15 {
                return Err(SpecError::InvalidDeviceChannel {
                    instrument: track.instrument.clone(),
                    message: format!("channel {} not in 0..=15", binding.channel),
                });
            }
            if !(-1..=127).contains(&binding.program) {
                return Err(SpecError::InvalidDeviceChannel {
                    instrument: track.instrument.clone(),
                    message: format!("program {} not in -1..=127", binding.program),
                });
            }
            if !device_names.contains(binding.device.as_str()) {
                return Err(SpecError::InvalidDeviceChannel {
                    instrument: track.instrument.clone(),
                    message: format!("unknown device '{}'", binding.device),
                });
            }
        }
        Ok(())
    }
}

fn default_beats_per_bar() -> u32 {
    4
}

fn default_ticks_per_beat() -> u32 {
    4
}

fn default_max_velocity() -> u32 {
    32767
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn minimal_doc() -> String {
        r#"{
            "version": "1",
            "structure": {"bars": 4},
            "harmony": {"type": "pattern", "chord_patterns": ["Am/4,F/4"]},
            "arrangement": {
                "activity_vectors": [{"name": "lead"}],
                "tracks": [{
                    "instrument": "lead",
                    "activity_vectors": ["lead"],
                    "sequence_engine": {"type": "pad", "offsets": [0, 1, 2]}
                }]
            },
            "player": {
                "type": "midi",
                "devices": [{"name": "out", "candidates": ["FLUID"]}],
                "instruments": {"lead": {"device": "out", "channel": 0}}
            }
        }"#
        .to_string()
    }

    #[test]
    fn minimal_document_parses() {
        let doc = SongDocument::from_str(&minimal_doc()).unwrap();
        assert_eq!(doc.structure.beats_per_bar, 4);
        assert_eq!(doc.structure.max_velocity, 32767);
    }

    #[test]
    fn version_mismatch_is_fatal() {
        let json = minimal_doc().replace(r#""version": "1""#, r#""version": "9""#);
        assert!(matches!(
            SongDocument::from_str(&json),
            Err(SpecError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn unknown_vector_reference_is_fatal() {
        let json = minimal_doc().replace(r#""activity_vectors": ["lead"]"#, r#""activity_vectors": ["nope"]"#);
        assert!(matches!(
            SongDocument::from_str(&json),
            Err(SpecError::UnknownActivityVector { .. })
        ));
    }

    #[test]
    fn missing_instrument_mapping_is_fatal() {
        let json = minimal_doc().replace(r#""instruments": {"lead""#, r#""instruments": {"other""#);
        assert!(matches!(
            SongDocument::from_str(&json),
            Err(SpecError::MissingInstrumentMapping { .. })
        ));
    }
}
