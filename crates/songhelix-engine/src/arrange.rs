//! The arrangement engine: one generation pass from document to song.

use log::{debug, info};

use songhelix_spec::arrangement::TrackKindSpec;
use songhelix_spec::seed::rng_for;
use songhelix_spec::song::SongDocument;

use crate::activity::ActivityVector;
use crate::error::EngineError;
use crate::harmony::build_harmony;
use crate::sequence::{Arrangement, TrackKind};
use crate::sequencers::{render_track, RenderContext};
use crate::solver;
use crate::song::{SongContext, Structure};

/// Generate a complete song from a validated document.
///
/// `seed_override` replaces the document seed (and the CLI's `seed:<n>` song
/// names land here); `name_override` replaces the configured song name.
pub fn generate_song(
    document: &SongDocument,
    seed_override: Option<u64>,
    name_override: Option<String>,
) -> Result<SongContext, EngineError> {
    let seed = seed_override.or(document.seed).unwrap_or(0);

    let mut structure_rng = rng_for(seed, "structure", None, None);
    let bars = document
        .structure
        .bars
        .resolve("structure.bars", &mut structure_rng)?;
    if bars <= 0 {
        return Err(EngineError::SequencerConfig {
            message: format!("structure.bars resolved to non-positive {}", bars),
        });
    }
    let structure = Structure::new(
        bars as u32,
        document.structure.beats_per_bar,
        document.structure.ticks_per_beat,
        document.structure.max_velocity,
    );

    let song_name = match (&name_override, &document.song_name) {
        (Some(name), _) => name.clone(),
        (None, Some(template)) => {
            let mut rng = rng_for(seed, "song_name", None, None);
            template.resolve("song_name", &mut rng)?
        }
        (None, None) => format!("song-{:016x}", seed),
    };

    let harmony_spec = &document.harmony;
    let songhelix_spec::HarmonySpec::Pattern(pattern_spec) = harmony_spec;
    let mut harmony_rng = rng_for(seed, "harmony", pattern_spec.seed, pattern_spec.salt);
    let harmony = build_harmony(harmony_spec, &structure, &mut harmony_rng)?;

    let arrangement_spec = &document.arrangement;
    let mut solver_rng = rng_for(
        seed,
        "arrangement",
        arrangement_spec.seed,
        arrangement_spec.salt,
    );
    let activity_matrix = solver::solve(arrangement_spec, &harmony, &mut solver_rng)?;

    let solo = arrangement_spec.tracks.iter().any(|t| t.solo);
    let mut arrangement = Arrangement::new();
    for track_spec in &arrangement_spec.tracks {
        if track_spec.mute || (solo && !track_spec.solo) {
            debug!("skipping track '{}'", track_spec.instrument);
            continue;
        }
        let path = format!("track/{}", track_spec.instrument);
        let mut track_rng = rng_for(seed, &path, track_spec.seed, track_spec.salt);

        let transposition = track_spec
            .transposition
            .as_ref()
            .map(|t| t.resolve("transposition", &mut track_rng))
            .transpose()?
            .unwrap_or(0) as i32;
        let velocity_scale = track_spec
            .velocity
            .as_ref()
            .map(|v| v.resolve("velocity", &mut track_rng))
            .transpose()?
            .map(|v| v as f64 / 100.0)
            .unwrap_or(1.0);

        let vectors: Vec<&ActivityVector> = track_spec
            .activity_vectors
            .iter()
            .map(|name| {
                activity_matrix
                    .get(name)
                    .ok_or_else(|| EngineError::UnknownActivityVector { name: name.clone() })
            })
            .collect::<Result<_, _>>()?;

        let ctx = RenderContext {
            structure: &structure,
            harmony: &harmony,
            activity_matrix: &activity_matrix,
            velocity_scale,
        };
        let mut track = render_track(&track_spec.sequence_engine, &ctx, &vectors, &mut track_rng)?;
        let expected_kind = match track_spec.kind {
            TrackKindSpec::Melodic => TrackKind::Melodic,
            TrackKindSpec::Rhythm => TrackKind::Rhythm,
        };
        track.kind = expected_kind;
        if transposition != 0 {
            for sequence in &mut track.sequences {
                sequence.transpose(transposition);
            }
        }
        arrangement.add(track_spec.instrument.clone(), track);
    }

    info!(
        "generated '{}': {} ticks, {} sections, {} tracks (seed {})",
        song_name,
        structure.total_ticks(),
        harmony.section_count(),
        arrangement.entries().len(),
        seed
    );

    Ok(SongContext {
        structure,
        harmony,
        activity_matrix,
        arrangement,
        song_name,
        seed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn document(json: &str) -> SongDocument {
        SongDocument::from_str(json).unwrap()
    }

    fn full_doc() -> SongDocument {
        document(
            r#"{
            "version": "1",
            "seed": 42,
            "structure": {"bars": 4, "beats_per_bar": 4, "ticks_per_beat": 4},
            "harmony": {"type": "pattern", "chord_patterns": ["+Am/4,+F/4,+C/4,+G/4"]},
            "arrangement": {
                "max_iterations": 100000,
                "start_activity_counts": [1, 2],
                "stop_activity_counts": [1],
                "activity_vectors": [
                    {"name": "pad", "min_active": 20},
                    {"name": "lead", "min_active": 20},
                    {"name": "drums", "allow_inactive": true}
                ],
                "tracks": [
                    {
                        "instrument": "pad",
                        "activity_vectors": ["pad"],
                        "sequence_engine": {"type": "pad", "offsets": [0, 1, 2]}
                    },
                    {
                        "instrument": "lead",
                        "transposition": 12,
                        "activity_vectors": ["lead"],
                        "sequence_engine": {"type": "melody", "patterns": ["+/2,+/2,#/2,*/2"]}
                    },
                    {
                        "instrument": "drums",
                        "kind": "rhythm",
                        "activity_vectors": ["drums"],
                        "sequence_engine": {
                            "type": "drum",
                            "voices": [
                                {"pattern": "E(3,8,x,-)", "pitch": 36, "activity_vector": "drums"}
                            ]
                        }
                    }
                ]
            },
            "player": {
                "type": "midi",
                "devices": [{"name": "out", "candidates": ["FLUID"]}],
                "instruments": {
                    "pad": {"device": "out", "channel": 0, "program": 89},
                    "lead": {"device": "out", "channel": 1},
                    "drums": {"device": "out", "channel": 9}
                }
            }
        }"#,
        )
    }

    #[test]
    fn generates_a_complete_song() {
        let context = generate_song(&full_doc(), None, None).unwrap();
        assert_eq!(context.structure.total_ticks(), 64);
        assert_eq!(context.harmony.section_count(), 4);
        assert_eq!(context.activity_matrix.len(), 3);
        assert_eq!(context.arrangement.entries().len(), 3);
        for entry in context.arrangement.entries() {
            for sequence in &entry.track.sequences {
                assert_eq!(sequence.total_ticks(), 64, "track {}", entry.instrument);
            }
        }
        assert_eq!(
            context.arrangement.get("drums").unwrap().kind,
            TrackKind::Rhythm
        );
    }

    #[test]
    fn identical_seeds_generate_identical_songs() {
        let a = generate_song(&full_doc(), None, None).unwrap();
        let b = generate_song(&full_doc(), None, None).unwrap();
        assert_eq!(a.arrangement, b.arrangement);
        assert_eq!(a.harmony, b.harmony);
        assert_eq!(a.song_name, b.song_name);
    }

    #[test]
    fn different_seeds_differ() {
        let a = generate_song(&full_doc(), Some(1), None).unwrap();
        let b = generate_song(&full_doc(), Some(2), None).unwrap();
        // The generated names always differ; the arrangements almost surely.
        assert_ne!(a.song_name, b.song_name);
    }

    #[test]
    fn solo_and_mute_filter_tracks() {
        let mut doc = full_doc();
        doc.arrangement.tracks[0].solo = true;
        let context = generate_song(&doc, None, None).unwrap();
        assert_eq!(context.arrangement.entries().len(), 1);
        assert_eq!(context.arrangement.entries()[0].instrument, "pad");

        let mut doc = full_doc();
        doc.arrangement.tracks[1].mute = true;
        let context = generate_song(&doc, None, None).unwrap();
        assert!(context.arrangement.get("lead").is_none());
    }

    #[test]
    fn name_override_wins() {
        let context = generate_song(&full_doc(), None, Some("custom".to_string())).unwrap();
        assert_eq!(context.song_name, "custom");
    }
}
