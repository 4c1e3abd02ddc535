//! Sequences, tracks, and the arrangement.

/// One entry of a sequence: a sounding note or a rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEntry {
    Note {
        pitch: i32,
        /// MIDI velocity 0-127 (already mapped from song units).
        velocity: u8,
        ticks: u32,
        /// Tie into the immediately following note.
        legato: bool,
    },
    Pause {
        ticks: u32,
    },
}

impl SequenceEntry {
    /// Entry length in ticks.
    pub fn ticks(&self) -> u32 {
        match self {
            SequenceEntry::Note { ticks, .. } | SequenceEntry::Pause { ticks } => *ticks,
        }
    }

    /// Whether the entry is a note.
    pub fn is_note(&self) -> bool {
        matches!(self, SequenceEntry::Note { .. })
    }
}

/// An ordered per-voice timeline whose entry lengths sum to the song ticks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sequence {
    entries: Vec<SequenceEntry>,
}

impl Sequence {
    /// Empty sequence.
    pub fn new() -> Self {
        Sequence::default()
    }

    /// Append a note.
    pub fn add_note(&mut self, pitch: i32, velocity: u8, ticks: u32, legato: bool) {
        if ticks > 0 {
            self.entries.push(SequenceEntry::Note {
                pitch,
                velocity,
                ticks,
                legato,
            });
        }
    }

    /// Append a pause, coalescing with a trailing pause.
    pub fn add_pause(&mut self, ticks: u32) {
        if ticks == 0 {
            return;
        }
        if let Some(SequenceEntry::Pause { ticks: last }) = self.entries.last_mut() {
            *last += ticks;
        } else {
            self.entries.push(SequenceEntry::Pause { ticks });
        }
    }

    /// The entries in timeline order.
    pub fn entries(&self) -> &[SequenceEntry] {
        &self.entries
    }

    /// Total length in ticks.
    pub fn total_ticks(&self) -> u64 {
        self.entries.iter().map(|e| e.ticks() as u64).sum()
    }

    /// Add a semitone delta to every note pitch.
    pub fn transpose(&mut self, delta: i32) {
        for entry in &mut self.entries {
            if let SequenceEntry::Note { pitch, .. } = entry {
                *pitch += delta;
            }
        }
    }

    /// Whether the entry at `index` is effectively legato: flagged legato
    /// and directly followed by a note.
    pub fn is_legato_at(&self, index: usize) -> bool {
        match self.entries.get(index) {
            Some(SequenceEntry::Note { legato: true, .. }) => {
                matches!(self.entries.get(index + 1), Some(SequenceEntry::Note { .. }))
            }
            _ => false,
        }
    }
}

/// Whether a track follows the global transposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Pitched material; transposed by the player.
    Melodic,
    /// Percussive material; pitches are absolute keys.
    Rhythm,
}

/// One instrument's rendered output: one or more sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub kind: TrackKind,
    pub sequences: Vec<Sequence>,
}

impl Track {
    /// New track of the given kind.
    pub fn new(kind: TrackKind) -> Self {
        Track {
            kind,
            sequences: Vec::new(),
        }
    }
}

/// A named track of the arrangement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrangementEntry {
    pub instrument: String,
    pub track: Track,
}

/// The full set of rendered tracks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Arrangement {
    entries: Vec<ArrangementEntry>,
}

impl Arrangement {
    /// Empty arrangement.
    pub fn new() -> Self {
        Arrangement::default()
    }

    /// Append a track.
    pub fn add(&mut self, instrument: impl Into<String>, track: Track) {
        self.entries.push(ArrangementEntry {
            instrument: instrument.into(),
            track,
        });
    }

    /// The entries in configuration order.
    pub fn entries(&self) -> &[ArrangementEntry] {
        &self.entries
    }

    /// Look up a track by instrument name.
    pub fn get(&self, instrument: &str) -> Option<&Track> {
        self.entries
            .iter()
            .find(|e| e.instrument == instrument)
            .map(|e| &e.track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pauses_coalesce() {
        let mut seq = Sequence::new();
        seq.add_pause(2);
        seq.add_pause(3);
        seq.add_note(60, 100, 1, false);
        seq.add_pause(1);
        assert_eq!(seq.entries().len(), 3);
        assert_eq!(seq.total_ticks(), 7);
    }

    #[test]
    fn legato_requires_adjacent_note() {
        let mut seq = Sequence::new();
        seq.add_note(60, 100, 2, true);
        seq.add_note(62, 100, 2, false);
        seq.add_note(64, 100, 2, true);
        seq.add_pause(2);
        assert!(seq.is_legato_at(0));
        assert!(!seq.is_legato_at(1));
        assert!(!seq.is_legato_at(2));
    }

    #[test]
    fn arrangement_lookup_by_name() {
        let mut arr = Arrangement::new();
        arr.add("lead", Track::new(TrackKind::Melodic));
        arr.add("drums", Track::new(TrackKind::Rhythm));
        assert!(arr.get("lead").is_some());
        assert!(arr.get("bass").is_none());
        assert_eq!(arr.entries().len(), 2);
    }
}
