//! Chords: three distinct pitches with named qualities and inversions.

use std::fmt;

use crate::error::EngineError;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Interval signature of a root-position chord quality, relative to the
/// lowest pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChordQuality {
    Major,
    Minor,
    Diminished,
    Augmented,
    Sus2,
    Sus4,
    /// Dominant seventh voiced as three pitches (root, third, seventh).
    Seventh,
    /// Minor seventh voiced as three pitches.
    MinorSeventh,
}

impl ChordQuality {
    /// Semitone offsets of the quality in root position.
    pub fn intervals(&self) -> (i32, i32) {
        match self {
            ChordQuality::Major => (4, 7),
            ChordQuality::Minor => (3, 7),
            ChordQuality::Diminished => (3, 6),
            ChordQuality::Augmented => (4, 8),
            ChordQuality::Sus2 => (2, 7),
            ChordQuality::Sus4 => (5, 7),
            ChordQuality::Seventh => (4, 10),
            ChordQuality::MinorSeventh => (3, 10),
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            ChordQuality::Major => "",
            ChordQuality::Minor => "m",
            ChordQuality::Diminished => "dim",
            ChordQuality::Augmented => "aug",
            ChordQuality::Sus2 => "sus2",
            ChordQuality::Sus4 => "sus4",
            ChordQuality::Seventh => "7",
            ChordQuality::MinorSeventh => "m7",
        }
    }
}

/// Chord inversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Inversion {
    /// Root position (no suffix).
    #[default]
    Root,
    /// First inversion (suffix `6`... voiced with the root on top).
    First,
    /// Second inversion (suffix `4`).
    Second,
}

/// A chord: three distinct pitches in ascending order.
///
/// Pitches are semitones relative to the song's reference C; the player adds
/// the configured transposition to obtain MIDI notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chord {
    pitches: [i32; 3],
}

impl Chord {
    /// Build a chord from three pitches (any order, must be distinct).
    pub fn new(p1: i32, p2: i32, p3: i32) -> Result<Self, EngineError> {
        let mut pitches = [p1, p2, p3];
        pitches.sort_unstable();
        if pitches[0] == pitches[1] || pitches[1] == pitches[2] {
            return Err(EngineError::DegenerateChord { p1, p2, p3 });
        }
        Ok(Chord { pitches })
    }

    /// Build a root-position chord of the given quality on a root pitch.
    pub fn from_quality(root: i32, quality: ChordQuality) -> Self {
        let (third, fifth) = quality.intervals();
        Chord {
            pitches: [root, root + third, root + fifth],
        }
    }

    /// Parse a chord name like `Am`, `C#7`, `Absus4`, `Caug6`, `Adim4`.
    ///
    /// An inversion digit (`4` = first, `6` = second) may follow the quality.
    /// Named roots at or above `crossover_pitch` are dropped an octave.
    pub fn from_name(name: &str, crossover_pitch: i32) -> Result<Self, EngineError> {
        let unknown = || EngineError::UnknownChord {
            name: name.to_string(),
        };
        let bytes = name.as_bytes();
        if bytes.is_empty() {
            return Err(unknown());
        }
        let base = match bytes[0].to_ascii_uppercase() {
            b'C' => 0,
            b'D' => 2,
            b'E' => 4,
            b'F' => 5,
            b'G' => 7,
            b'A' => 9,
            b'B' => 11,
            _ => return Err(unknown()),
        };
        let mut idx = 1usize;
        let mut root: i32 = base;
        if idx < bytes.len() {
            match bytes[idx] {
                b'#' => {
                    root += 1;
                    idx += 1;
                }
                b'b' => {
                    root -= 1;
                    idx += 1;
                }
                _ => {}
            }
        }
        root = root.rem_euclid(12);
        if root >= crossover_pitch {
            root -= 12;
        }

        let rest = &name[idx..];
        // Longest quality suffix first, so `sus4` is not read as sus + inversion.
        let qualities: [(&str, ChordQuality); 8] = [
            ("sus2", ChordQuality::Sus2),
            ("sus4", ChordQuality::Sus4),
            ("dim", ChordQuality::Diminished),
            ("aug", ChordQuality::Augmented),
            ("m7", ChordQuality::MinorSeventh),
            ("m", ChordQuality::Minor),
            ("7", ChordQuality::Seventh),
            ("", ChordQuality::Major),
        ];
        let (quality, rest) = qualities
            .iter()
            .find_map(|(prefix, quality)| {
                rest.strip_prefix(prefix).map(|tail| (*quality, tail))
            })
            .ok_or_else(unknown)?;
        let inversion = match rest {
            "" => Inversion::Root,
            "4" => Inversion::First,
            "6" => Inversion::Second,
            _ => return Err(unknown()),
        };

        let chord = Chord::from_quality(root, quality);
        Ok(match inversion {
            Inversion::Root => chord,
            Inversion::First => chord.rotate_up(),
            Inversion::Second => chord.rotate_up().rotate_up(),
        })
    }

    /// Lowest pitch.
    pub fn low(&self) -> i32 {
        self.pitches[0]
    }

    /// Middle pitch.
    pub fn middle(&self) -> i32 {
        self.pitches[1]
    }

    /// Highest pitch.
    pub fn high(&self) -> i32 {
        self.pitches[2]
    }

    /// Pitch by index 0..=2 (low to high), with octave wrap outside.
    ///
    /// Offset 3 on a triad is the low pitch one octave up, -1 the high pitch
    /// one octave down, matching chord-tone offset resolution in patterns.
    pub fn pitch_at_offset(&self, offset: i32) -> i32 {
        let octave = offset.div_euclid(3);
        let index = offset.rem_euclid(3) as usize;
        self.pitches[index] + 12 * octave
    }

    /// All three pitches, ascending.
    pub fn pitches(&self) -> [i32; 3] {
        self.pitches
    }

    /// Whether the (possibly octave-shifted) pitch class sounds in the chord.
    pub fn contains_class(&self, pitch: i32) -> bool {
        self.pitches
            .iter()
            .any(|p| (p - pitch).rem_euclid(12) == 0)
    }

    /// Move the lowest pitch up an octave (next inversion).
    pub fn rotate_up(&self) -> Self {
        Chord {
            pitches: [self.pitches[1], self.pitches[2], self.pitches[0] + 12],
        }
    }

    /// Move the highest pitch down an octave (previous inversion).
    pub fn rotate_down(&self) -> Self {
        Chord {
            pitches: [self.pitches[2] - 12, self.pitches[0], self.pitches[1]],
        }
    }

    /// Transpose all pitches by a semitone delta.
    pub fn transpose(&self, delta: i32) -> Self {
        Chord {
            pitches: [
                self.pitches[0] + delta,
                self.pitches[1] + delta,
                self.pitches[2] + delta,
            ],
        }
    }

    fn signature(&self) -> (i32, i32) {
        (
            self.pitches[1] - self.pitches[0],
            self.pitches[2] - self.pitches[0],
        )
    }

    /// Quality and inversion if this is a recognizable named chord.
    fn classify(&self) -> Option<(ChordQuality, Inversion)> {
        let sig = self.signature();
        for quality in [
            ChordQuality::Major,
            ChordQuality::Minor,
            ChordQuality::Diminished,
            ChordQuality::Augmented,
            ChordQuality::Sus2,
            ChordQuality::Sus4,
            ChordQuality::Seventh,
            ChordQuality::MinorSeventh,
        ] {
            let (third, fifth) = quality.intervals();
            if sig == (third, fifth) {
                return Some((quality, Inversion::Root));
            }
            // First inversion: third on the bottom, root on top.
            if sig == (fifth - third, 12 - third) {
                return Some((quality, Inversion::First));
            }
            // Second inversion: fifth on the bottom.
            if sig == (12 - fifth, 12 + third - fifth) {
                return Some((quality, Inversion::Second));
            }
        }
        None
    }

    /// Collapse inversions of major, minor, and diminished chords to root
    /// position. All other chords are returned unchanged.
    pub fn normalize(&self) -> Self {
        match self.classify() {
            Some((quality, inversion))
                if matches!(
                    quality,
                    ChordQuality::Major | ChordQuality::Minor | ChordQuality::Diminished
                ) =>
            {
                match inversion {
                    Inversion::Root => *self,
                    Inversion::First => self.rotate_down(),
                    Inversion::Second => self.rotate_up(),
                }
            }
            _ => *self,
        }
    }

    /// Whether both chords normalize to the same pitch-class set.
    pub fn is_equal_normalized(&self, other: &Chord) -> bool {
        let classes = |c: Chord| {
            let mut cs: [i32; 3] = c.normalize().pitches.map(|p| p.rem_euclid(12));
            cs.sort_unstable();
            cs
        };
        classes(*self) == classes(*other)
    }

    /// The inversion (shifted by octaves as needed) whose middle pitch is
    /// closest to `reference`'s middle pitch; ties break toward the lower.
    pub fn find_chord_closest_to(&self, reference: &Chord) -> Self {
        let target = reference.middle();
        let mut best = *self;
        let mut best_distance = (self.middle() - target).abs();
        // Walk rotations two octaves in both directions; middle pitches are
        // monotone along the rotation chain, so this range always brackets
        // the target.
        let mut candidate = *self;
        for _ in 0..6 {
            candidate = candidate.rotate_down();
        }
        for _ in 0..13 {
            candidate = candidate.rotate_up();
            let distance = (candidate.middle() - target).abs();
            if distance < best_distance
                || (distance == best_distance && candidate.middle() < best.middle())
            {
                best = candidate;
                best_distance = distance;
            }
        }
        best
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((quality, inversion)) = self.classify() {
            let root_pitch = match inversion {
                Inversion::Root => self.pitches[0],
                Inversion::First => self.pitches[2] - 12,
                Inversion::Second => self.pitches[1],
            };
            let root = NOTE_NAMES[root_pitch.rem_euclid(12) as usize];
            let inversion_suffix = match inversion {
                Inversion::Root => "",
                Inversion::First => "4",
                Inversion::Second => "6",
            };
            write!(f, "{}{}{}", root, quality.suffix(), inversion_suffix)
        } else {
            write!(
                f,
                "{}:{}:{}",
                self.pitches[0], self.pitches[1], self.pitches[2]
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_basic_qualities() {
        assert_eq!(Chord::from_name("C", 12).unwrap().pitches(), [0, 4, 7]);
        assert_eq!(Chord::from_name("Am", 12).unwrap().pitches(), [9, 12, 16]);
        assert_eq!(Chord::from_name("Cdim", 12).unwrap().pitches(), [0, 3, 6]);
        assert_eq!(Chord::from_name("Caug", 12).unwrap().pitches(), [0, 4, 8]);
        assert_eq!(Chord::from_name("Csus2", 12).unwrap().pitches(), [0, 2, 7]);
        assert_eq!(Chord::from_name("Csus4", 12).unwrap().pitches(), [0, 5, 7]);
        assert_eq!(Chord::from_name("C7", 12).unwrap().pitches(), [0, 4, 10]);
        assert_eq!(Chord::from_name("Cm7", 12).unwrap().pitches(), [0, 3, 10]);
    }

    #[test]
    fn parses_accidentals_and_crossover() {
        assert_eq!(Chord::from_name("C#", 12).unwrap().pitches(), [1, 5, 8]);
        assert_eq!(Chord::from_name("Ab", 12).unwrap().pitches(), [8, 12, 15]);
        // Crossover at D# (3): roots >= 3 drop an octave.
        assert_eq!(Chord::from_name("D", 3).unwrap().pitches(), [2, 6, 9]);
        assert_eq!(Chord::from_name("E", 3).unwrap().pitches(), [-8, -4, -1]);
    }

    #[test]
    fn parses_inversions() {
        // Am first inversion: C, E, A.
        assert_eq!(Chord::from_name("Am4", 12).unwrap().pitches(), [12, 16, 21]);
        // Am second inversion: E, A, C.
        assert_eq!(Chord::from_name("Am6", 12).unwrap().pitches(), [16, 21, 24]);
        assert_eq!(Chord::from_name("Csus24", 12).unwrap().pitches(), [2, 7, 12]);
    }

    #[test]
    fn rejects_unknown_names() {
        assert!(Chord::from_name("H", 12).is_err());
        assert!(Chord::from_name("Cmaj9", 12).is_err());
        assert!(Chord::from_name("", 12).is_err());
    }

    #[test]
    fn rejects_degenerate_pitch_sets() {
        assert!(Chord::new(0, 0, 7).is_err());
        assert!(Chord::new(0, 7, 7).is_err());
    }

    #[test]
    fn normalize_collapses_triad_inversions() {
        let root = Chord::from_name("Am", 12).unwrap();
        let first = root.rotate_up();
        let second = first.rotate_up();
        assert_eq!(first.normalize().pitches(), root.pitches());
        assert_eq!(second.normalize().pitches(), root.transpose(12).pitches());
        // Sus chords keep their voicing.
        let sus = Chord::from_name("Csus4", 12).unwrap().rotate_up();
        assert_eq!(sus.normalize().pitches(), sus.pitches());
    }

    #[test]
    fn equal_normalized_spans_inversions() {
        let am = Chord::from_name("Am", 12).unwrap();
        let first = am.rotate_up().transpose(-12);
        assert!(am.is_equal_normalized(&first));
        let c = Chord::from_name("C", 12).unwrap();
        assert!(!am.is_equal_normalized(&c));
    }

    #[test]
    fn closest_to_minimizes_middle_distance() {
        let c = Chord::from_name("C", 12).unwrap();
        let g = Chord::from_name("G", 12).unwrap();
        let voiced = g.find_chord_closest_to(&c);
        // Candidates around middle 4: G root at -5 has middle -1, first
        // inversion B,D,G has middle 2 — the winner.
        assert!((voiced.middle() - c.middle()).abs() <= 3);
        assert!(voiced.is_equal_normalized(&g));
    }

    #[test]
    fn display_round_trips_names() {
        for name in ["C", "Am", "F#dim", "Caug", "Dsus2", "Gsus4", "A7", "Em7"] {
            let chord = Chord::from_name(name, 12).unwrap();
            assert_eq!(chord.to_string(), *name);
        }
        assert_eq!(Chord::new(0, 1, 2).unwrap().to_string(), "0:1:2");
    }

    #[test]
    fn pitch_at_offset_wraps_octaves() {
        let c = Chord::from_name("C", 12).unwrap();
        assert_eq!(c.pitch_at_offset(0), 0);
        assert_eq!(c.pitch_at_offset(1), 4);
        assert_eq!(c.pitch_at_offset(2), 7);
        assert_eq!(c.pitch_at_offset(3), 12);
        assert_eq!(c.pitch_at_offset(-1), -5);
    }
}
