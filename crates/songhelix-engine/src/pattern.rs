//! Patterns: reusable rhythmic/melodic building blocks.

use crate::error::EngineError;

/// One pattern entry: a note (possibly a wildcard) or a pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternEntry {
    Note {
        /// Concrete pitch offset, or `None` for a wildcard.
        pitch: Option<i32>,
        /// Wildcard character when `pitch` is `None`.
        wildcard: Option<char>,
        /// Velocity in song units (up to the structure's max velocity).
        velocity: i32,
        /// Length in pattern ticks.
        ticks: u32,
        /// Tie into the following note.
        legato: bool,
    },
    Pause {
        /// Length in pattern ticks.
        ticks: u32,
    },
}

impl PatternEntry {
    /// Entry length in ticks.
    pub fn ticks(&self) -> u32 {
        match self {
            PatternEntry::Note { ticks, .. } | PatternEntry::Pause { ticks } => *ticks,
        }
    }

    /// Whether the entry is a note.
    pub fn is_note(&self) -> bool {
        matches!(self, PatternEntry::Note { .. })
    }

    fn with_ticks(self, ticks: u32) -> Self {
        match self {
            PatternEntry::Note {
                pitch,
                wildcard,
                velocity,
                legato,
                ..
            } => PatternEntry::Note {
                pitch,
                wildcard,
                velocity,
                ticks,
                legato,
            },
            PatternEntry::Pause { .. } => PatternEntry::Pause { ticks },
        }
    }
}

/// An ordered list of entries carrying its own ticks-per-beat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    entries: Vec<PatternEntry>,
    ticks_per_beat: u32,
}

impl Pattern {
    /// Build a pattern from entries.
    pub fn new(entries: Vec<PatternEntry>, ticks_per_beat: u32) -> Self {
        Pattern {
            entries,
            ticks_per_beat,
        }
    }

    /// The pattern's entries.
    pub fn entries(&self) -> &[PatternEntry] {
        &self.entries
    }

    /// The pattern's native ticks-per-beat.
    pub fn ticks_per_beat(&self) -> u32 {
        self.ticks_per_beat
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pattern has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry by index, wrapping over the pattern length.
    pub fn entry_wrapped(&self, index: usize) -> &PatternEntry {
        &self.entries[index % self.entries.len()]
    }

    /// Total length in ticks.
    pub fn total_ticks(&self) -> u32 {
        self.entries.iter().map(PatternEntry::ticks).sum()
    }

    /// Rescale to a consumer's ticks-per-beat.
    ///
    /// The target must be an exact integer multiple of the pattern's own
    /// ticks-per-beat.
    pub fn scale_to(&self, ticks_per_beat: u32) -> Result<Pattern, EngineError> {
        if ticks_per_beat == self.ticks_per_beat {
            return Ok(self.clone());
        }
        if self.ticks_per_beat == 0 || ticks_per_beat % self.ticks_per_beat != 0 {
            return Err(EngineError::TicksPerBeatMismatch {
                pattern_tpb: self.ticks_per_beat,
                target_tpb: ticks_per_beat,
            });
        }
        let factor = ticks_per_beat / self.ticks_per_beat;
        let entries = self
            .entries
            .iter()
            .map(|e| e.with_ticks(e.ticks() * factor))
            .collect();
        Ok(Pattern::new(entries, ticks_per_beat))
    }

    /// Add a delta to every concrete note pitch.
    pub fn transpose(&self, delta: i32) -> Pattern {
        let entries = self
            .entries
            .iter()
            .map(|e| match *e {
                PatternEntry::Note {
                    pitch: Some(p),
                    wildcard,
                    velocity,
                    ticks,
                    legato,
                } => PatternEntry::Note {
                    pitch: Some(p + delta),
                    wildcard,
                    velocity,
                    ticks,
                    legato,
                },
                other => other,
            })
            .collect();
        Pattern::new(entries, self.ticks_per_beat)
    }

    /// Concatenate `n` copies of the pattern.
    pub fn repeat(&self, n: u32) -> Pattern {
        let mut entries = Vec::with_capacity(self.entries.len() * n as usize);
        for _ in 0..n {
            entries.extend_from_slice(&self.entries);
        }
        Pattern::new(entries, self.ticks_per_beat)
    }
}
