//! The melody engine: one fixed random melody per distinct chord section.

use std::collections::HashMap;

use rand::Rng;
use rand_pcg::Pcg32;

use songhelix_spec::sequencers::MelodySpec;

use crate::activity::ActivityVector;
use crate::error::EngineError;
use crate::harmony::Harmony;
use crate::pattern::{Pattern, PatternEntry};
use crate::patterns::{build_pattern, PatternContext};
use crate::sequence::{Sequence, Track, TrackKind};

use super::RenderContext;

const MELODY_WILDCARDS: &[char] = &['+', '#', '*'];
const MAX_PITCH_TRIES: u32 = 10_000;

/// Pitch classes of the C major / A minor scale.
const SCALE: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

/// One note or pause of a generated melody, positioned inside its section.
#[derive(Debug, Clone, Copy)]
struct MelodyNote {
    pitch: Option<i32>,
    velocity: i32,
    ticks: u32,
    legato: bool,
}

/// Render a melody track.
///
/// Sections with identical chord content share their melodies: for each
/// distinct section, `melodies` alternatives are generated once and cycled
/// round-robin across that section's occurrences.
pub(super) fn render(
    spec: &MelodySpec,
    ctx: &RenderContext,
    vector: &ActivityVector,
    rng: &mut Pcg32,
) -> Result<Track, EngineError> {
    if spec.patterns.is_empty() {
        return Err(EngineError::SequencerConfig {
            message: "melody engine needs at least one pattern".to_string(),
        });
    }
    if spec.min_pitch > spec.max_pitch {
        return Err(EngineError::SequencerConfig {
            message: "melody min_pitch exceeds max_pitch".to_string(),
        });
    }
    let pattern_ctx = PatternContext {
        wildcards: MELODY_WILDCARDS,
        max_velocity: ctx.structure.max_velocity,
    };
    let patterns: Vec<Pattern> = spec
        .patterns
        .iter()
        .map(|source| {
            build_pattern(source, &pattern_ctx, rng)
                .and_then(|p| p.scale_to(ctx.structure.ticks_per_beat))
        })
        .collect::<Result<_, _>>()?;

    let harmony = ctx.harmony;
    let melody_count = spec.melodies.max(1) as usize;
    let mut melodies: HashMap<String, Vec<Vec<MelodyNote>>> = HashMap::new();
    let mut occurrences: HashMap<String, usize> = HashMap::new();
    let mut sequence = Sequence::new();

    for section in 0..harmony.section_count() {
        let signature = section_signature(harmony, section);
        if !melodies.contains_key(&signature) {
            let generated: Vec<Vec<MelodyNote>> = (0..melody_count)
                .map(|index| {
                    let pattern = &patterns[index % patterns.len()];
                    generate_melody(spec, harmony, section, pattern, rng)
                })
                .collect::<Result<_, _>>()?;
            melodies.insert(signature.clone(), generated);
        }
        let occurrence = occurrences.entry(signature.clone()).or_insert(0);
        let melody = &melodies[&signature][*occurrence % melody_count];
        *occurrence += 1;

        let (start, _) = harmony.section_range(section);
        let mut tick = start;
        for note in melody {
            match note.pitch {
                Some(pitch) if vector.is_active(tick) => {
                    sequence.add_note(
                        pitch,
                        ctx.map_velocity(note.velocity),
                        note.ticks,
                        note.legato,
                    );
                }
                _ => sequence.add_pause(note.ticks),
            }
            tick += note.ticks as usize;
        }
    }

    let mut track = Track::new(TrackKind::Melodic);
    track.sequences.push(sequence);
    Ok(track)
}

/// Chord content of a section, as a memoization key.
fn section_signature(harmony: &Harmony, section: usize) -> String {
    let (start, end) = harmony.section_range(section);
    let mut parts = Vec::new();
    let mut tick = start;
    while tick < end {
        let run = harmony.chord_ticks(tick).min(end - tick);
        parts.push(format!("{}/{}", harmony.chord(tick), run));
        tick += run;
    }
    parts.join(",")
}

/// Generate one melody covering a section, resolving wildcards.
fn generate_melody(
    spec: &MelodySpec,
    harmony: &Harmony,
    section: usize,
    pattern: &Pattern,
    rng: &mut Pcg32,
) -> Result<Vec<MelodyNote>, EngineError> {
    let (start, end) = harmony.section_range(section);
    let mut notes = Vec::new();
    let mut previous_pitch = harmony.chord(start).middle();
    let mut entry_index = 0usize;
    let mut tick = start;
    while tick < end {
        let entry = pattern.entry_wrapped(entry_index);
        entry_index += 1;
        // Clip at the section end and at the chord run end.
        let chord_end = tick + harmony.chord_ticks(tick);
        let ticks = (entry.ticks() as usize).min(end - tick).min(chord_end - tick) as u32;
        match *entry {
            PatternEntry::Pause { .. } => notes.push(MelodyNote {
                pitch: None,
                velocity: 0,
                ticks,
                legato: false,
            }),
            PatternEntry::Note {
                pitch,
                wildcard,
                velocity,
                legato,
                ..
            } => {
                let resolved = match (pitch, wildcard) {
                    (Some(pitch), _) => pitch,
                    (None, Some('*')) => previous_pitch,
                    (None, Some('#')) => closest_chord_tone(harmony, tick, previous_pitch),
                    (None, Some('+')) => free_pitch(spec, previous_pitch, rng)?,
                    (None, other) => {
                        return Err(EngineError::SequencerConfig {
                            message: format!("melody engine cannot resolve wildcard {:?}", other),
                        })
                    }
                };
                previous_pitch = resolved;
                notes.push(MelodyNote {
                    pitch: Some(resolved),
                    velocity,
                    ticks,
                    legato,
                });
            }
        }
        tick += ticks as usize;
    }
    Ok(notes)
}

/// Draw a scale pitch near the previous one from the configured distances.
fn free_pitch(spec: &MelodySpec, previous: i32, rng: &mut Pcg32) -> Result<i32, EngineError> {
    for _ in 0..MAX_PITCH_TRIES {
        let distance = spec.pitch_distances[rng.gen_range(0..spec.pitch_distances.len())];
        let candidate = previous + distance;
        if candidate < spec.min_pitch || candidate > spec.max_pitch {
            continue;
        }
        if SCALE.contains(&candidate.rem_euclid(12)) {
            return Ok(candidate);
        }
    }
    Err(EngineError::MelodyPitchSearch {
        max_iterations: MAX_PITCH_TRIES,
    })
}

/// The chord tone closest to `previous`; ties break toward the lower tone.
fn closest_chord_tone(harmony: &Harmony, tick: usize, previous: i32) -> i32 {
    let chord = harmony.chord(tick);
    let mut best = chord.low();
    let mut best_distance = i32::MAX;
    for offset in -3..=5 {
        let tone = chord.pitch_at_offset(offset);
        let distance = (tone - previous).abs();
        if distance < best_distance {
            best = tone;
            best_distance = distance;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use songhelix_spec::patterns::PatternSource;

    use crate::sequencers::test_support::harmony;
    use crate::sequence::SequenceEntry;
    use crate::song::Structure;

    fn spec(patterns: &[&str], melodies: u32) -> MelodySpec {
        MelodySpec {
            patterns: patterns
                .iter()
                .map(|p| PatternSource::Literal(p.to_string()))
                .collect(),
            pitch_distances: vec![-2, -1, 1, 2],
            min_pitch: -3,
            max_pitch: 24,
            melodies,
            seed: None,
            salt: None,
        }
    }

    fn render_pitches(sections: usize, pattern: &str, seed: u64) -> Vec<Vec<i32>> {
        let structure = Structure::new(sections as u32, 4, 4, 32767);
        let h = harmony(sections, 16);
        let matrix = crate::activity::ActivityMatrix::new();
        let ctx = RenderContext {
            structure: &structure,
            harmony: &h,
            activity_matrix: &matrix,
            velocity_scale: 1.0,
        };
        let mut vector = ActivityVector::new();
        vector.add_activity(sections * 16);
        let mut rng = Pcg32::seed_from_u64(seed);
        let track = render(&spec(&[pattern], 1), &ctx, &vector, &mut rng).unwrap();
        let seq = &track.sequences[0];
        assert_eq!(seq.total_ticks(), (sections * 16) as u64);

        let mut sections_pitches = vec![Vec::new(); sections];
        let mut tick = 0usize;
        for entry in seq.entries() {
            if let SequenceEntry::Note { pitch, .. } = entry {
                sections_pitches[tick / 16].push(*pitch);
            }
            tick += entry.ticks() as usize;
        }
        sections_pitches
    }

    #[test]
    fn pitches_stay_in_range_and_on_scale() {
        for seed in 0..5 {
            let pitches = render_pitches(4, "+/2,+/2,+/2,+/2", seed);
            for pitch in pitches.iter().flatten() {
                assert!((-3..=24).contains(pitch));
                assert!(SCALE.contains(&pitch.rem_euclid(12)));
            }
        }
    }

    #[test]
    fn identical_sections_share_their_melody() {
        // Sections 0 and 2 are both Am, 1 and 3 both C.
        let pitches = render_pitches(4, "+/2,+/2,*/2,#/2", 9);
        assert_eq!(pitches[0], pitches[2]);
        assert_eq!(pitches[1], pitches[3]);
    }

    #[test]
    fn multiple_melodies_cycle_round_robin() {
        let structure = Structure::new(4, 4, 4, 32767);
        let h = harmony(4, 16);
        let matrix = crate::activity::ActivityMatrix::new();
        let ctx = RenderContext {
            structure: &structure,
            harmony: &h,
            activity_matrix: &matrix,
            velocity_scale: 1.0,
        };
        let mut vector = ActivityVector::new();
        vector.add_activity(64);
        let mut rng = Pcg32::seed_from_u64(3);
        let track = render(&spec(&["+/2"], 2), &ctx, &vector, &mut rng).unwrap();
        assert_eq!(track.sequences[0].total_ticks(), 64);
    }

    #[test]
    fn repeat_wildcard_repeats_and_chord_tone_lands_on_chord() {
        let structure = Structure::new(2, 4, 4, 32767);
        let h = harmony(2, 16);
        let matrix = crate::activity::ActivityMatrix::new();
        let ctx = RenderContext {
            structure: &structure,
            harmony: &h,
            activity_matrix: &matrix,
            velocity_scale: 1.0,
        };
        let mut vector = ActivityVector::new();
        vector.add_activity(32);
        let mut rng = Pcg32::seed_from_u64(1);
        let track = render(&spec(&["#/4,*/4,#/4,*/4"], 1), &ctx, &vector, &mut rng).unwrap();
        let pitches: Vec<i32> = track.sequences[0]
            .entries()
            .iter()
            .filter_map(|e| match e {
                SequenceEntry::Note { pitch, .. } => Some(*pitch),
                _ => None,
            })
            .collect();
        assert_eq!(pitches.len(), 8);
        // Pairs repeat, and chord-tone picks sound in the section's chord.
        assert_eq!(pitches[0], pitches[1]);
        assert_eq!(pitches[2], pitches[3]);
        let am = crate::chord::Chord::from_name("Am", 12).unwrap();
        assert!(am.contains_class(pitches[0]));
    }

    #[test]
    fn inactive_sections_are_silent() {
        let structure = Structure::new(2, 4, 4, 32767);
        let h = harmony(2, 16);
        let matrix = crate::activity::ActivityMatrix::new();
        let ctx = RenderContext {
            structure: &structure,
            harmony: &h,
            activity_matrix: &matrix,
            velocity_scale: 1.0,
        };
        let mut vector = ActivityVector::new();
        vector.add_activity(16);
        vector.add_inactivity(16);
        let mut rng = Pcg32::seed_from_u64(1);
        let track = render(&spec(&["+/2"], 1), &ctx, &vector, &mut rng).unwrap();
        let seq = &track.sequences[0];
        let mut tick = 0usize;
        for entry in seq.entries() {
            if tick >= 16 {
                assert!(!entry.is_note(), "note in inactive region at {}", tick);
            }
            tick += entry.ticks() as usize;
        }
    }
}
