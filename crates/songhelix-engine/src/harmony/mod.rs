//! The harmony engine: per-tick chord timeline with chord sections.

use log::debug;
use rand::Rng;
use rand_pcg::Pcg32;

use songhelix_spec::harmony::{ChordPatternSpec, HarmonySpec};

use crate::chord::Chord;
use crate::error::EngineError;
use crate::song::Structure;

pub mod grammar;

use grammar::{ChordAtom, ChordSpec};

/// How often an unfulfillable random-table draw is retried before the whole
/// pattern resolution restarts, and how often the resolution restarts before
/// giving up.
const MAX_DRAW_TRIES: usize = 1000;
const MAX_RESTARTS: usize = 1000;

/// One contiguous run of a single chord.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChordRun {
    chord: Chord,
    start: usize,
    end: usize,
}

/// An immutable tick-indexed chord timeline with chord-section boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Harmony {
    runs: Vec<ChordRun>,
    /// Section start ticks; `sections[0] == 0`.
    sections: Vec<usize>,
    total_ticks: usize,
}

impl Harmony {
    /// Build from a resolved timeline of `(chord, ticks, new_section)`
    /// entries. Adjacent equal-normalized chords are merged into one run;
    /// section boundaries are preserved.
    pub fn from_timeline(
        timeline: &[(Chord, usize, bool)],
        total_ticks: usize,
    ) -> Result<Self, EngineError> {
        let mut runs: Vec<ChordRun> = Vec::new();
        let mut sections = vec![0usize];
        let mut tick = 0usize;
        for (chord, ticks, new_section) in timeline {
            if *new_section && tick > 0 {
                sections.push(tick);
            }
            match runs.last_mut() {
                Some(last) if last.chord.is_equal_normalized(chord) => {
                    last.end += ticks;
                }
                _ => runs.push(ChordRun {
                    chord: *chord,
                    start: tick,
                    end: tick + ticks,
                }),
            }
            tick += ticks;
        }
        let harmony = Harmony {
            runs,
            sections,
            total_ticks,
        };
        harmony.check_sanity()?;
        Ok(harmony)
    }

    /// Total song ticks.
    pub fn total_ticks(&self) -> usize {
        self.total_ticks
    }

    /// The chord sounding at a tick.
    pub fn chord(&self, tick: usize) -> Chord {
        self.runs[self.run_index(tick)].chord
    }

    /// Remaining ticks of the chord run containing `tick` (>= 1).
    pub fn chord_ticks(&self, tick: usize) -> usize {
        self.runs[self.run_index(tick)].end - tick
    }

    /// Ticks elapsed since the start of the chord run containing `tick`.
    pub fn ticks_into_chord(&self, tick: usize) -> usize {
        tick - self.runs[self.run_index(tick)].start
    }

    /// Remaining ticks of the chord section containing `tick` (>= 1).
    pub fn chord_section_ticks(&self, tick: usize) -> usize {
        let section = self.section_of_tick(tick);
        let end = self
            .sections
            .get(section + 1)
            .copied()
            .unwrap_or(self.total_ticks);
        end - tick
    }

    /// Number of chord sections.
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Section start ticks, ascending; the first is always 0.
    pub fn section_boundaries(&self) -> &[usize] {
        &self.sections
    }

    /// Index of the section containing `tick`.
    pub fn section_of_tick(&self, tick: usize) -> usize {
        match self.sections.binary_search(&tick) {
            Ok(i) => i,
            Err(i) => i - 1,
        }
    }

    /// Half-open tick range of a section.
    pub fn section_range(&self, section: usize) -> (usize, usize) {
        let start = self.sections[section];
        let end = self
            .sections
            .get(section + 1)
            .copied()
            .unwrap_or(self.total_ticks);
        (start, end)
    }

    /// Whether a chord or section boundary lies at `tick`.
    pub fn is_chord_boundary(&self, tick: usize) -> bool {
        self.runs[self.run_index(tick)].start == tick
    }

    fn run_index(&self, tick: usize) -> usize {
        debug_assert!(tick < self.total_ticks);
        self.runs
            .partition_point(|run| run.end <= tick)
    }

    /// Verify the timeline invariants.
    ///
    /// Every tick carries a chord; the chord and section tick counters are
    /// at least 1 and strictly decrement within a run; adjacent runs are not
    /// equal-normalized; sections are non-empty and strictly ascending.
    pub fn check_sanity(&self) -> Result<(), EngineError> {
        let fail = |tick: usize, message: String| EngineError::HarmonySanity { tick, message };
        if self.total_ticks == 0 {
            return Err(fail(0, "song has zero ticks".to_string()));
        }
        if self.runs.is_empty() || self.runs[0].start != 0 {
            return Err(fail(0, "timeline does not start at tick 0".to_string()));
        }
        let mut expected_start = 0usize;
        for (i, run) in self.runs.iter().enumerate() {
            if run.start != expected_start {
                return Err(fail(run.start, "gap or overlap between chord runs".to_string()));
            }
            if run.end <= run.start {
                return Err(fail(run.start, "empty chord run".to_string()));
            }
            if let Some(prev) = i.checked_sub(1).map(|p| &self.runs[p]) {
                if prev.chord.is_equal_normalized(&run.chord) {
                    return Err(fail(
                        run.start,
                        "adjacent equal-normalized chords were not merged".to_string(),
                    ));
                }
            }
            expected_start = run.end;
        }
        if expected_start != self.total_ticks {
            return Err(fail(
                expected_start,
                format!("timeline covers {} of {} ticks", expected_start, self.total_ticks),
            ));
        }
        if self.sections.first() != Some(&0) {
            return Err(fail(0, "first section does not start at tick 0".to_string()));
        }
        for pair in self.sections.windows(2) {
            if pair[0] >= pair[1] {
                return Err(fail(pair[1], "empty or unordered chord section".to_string()));
            }
        }
        if let Some(&last) = self.sections.last() {
            if last >= self.total_ticks {
                return Err(fail(last, "section starts past the song end".to_string()));
            }
        }
        // Counter invariants, tick by tick.
        for tick in 1..self.total_ticks {
            if !self.is_chord_boundary(tick) {
                if self.chord_ticks(tick) != self.chord_ticks(tick - 1) - 1 {
                    return Err(fail(tick, "chord tick counter does not decrement".to_string()));
                }
                if self.chord(tick) != self.chord(tick - 1) {
                    return Err(fail(tick, "chord changes within a run".to_string()));
                }
            }
            if !self.sections.contains(&tick)
                && self.chord_section_ticks(tick) != self.chord_section_ticks(tick - 1) - 1
            {
                return Err(fail(tick, "section tick counter does not decrement".to_string()));
            }
        }
        Ok(())
    }
}

/// Build the song's harmony from its configuration.
pub fn build_harmony(
    spec: &HarmonySpec,
    structure: &Structure,
    rng: &mut Pcg32,
) -> Result<Harmony, EngineError> {
    let HarmonySpec::Pattern(pattern_spec) = spec;
    build_pattern_harmony(pattern_spec, structure, rng)
}

fn build_pattern_harmony(
    spec: &ChordPatternSpec,
    structure: &Structure,
    rng: &mut Pcg32,
) -> Result<Harmony, EngineError> {
    if spec.chord_patterns.is_empty() {
        return Err(EngineError::ChordPatternSyntax {
            pattern: String::new(),
            message: "no chord patterns configured".to_string(),
        });
    }
    let pattern = &spec.chord_patterns[rng.gen_range(0..spec.chord_patterns.len())];
    let atoms = grammar::parse_chord_pattern(pattern)?;
    let tables = parse_random_tables(spec)?;

    let mut chords = resolve_atoms(pattern, &atoms, &tables, spec.crossover_pitch, rng)?;
    if spec.minimize_chord_distance {
        let first = chords[0];
        for chord in chords.iter_mut().skip(1) {
            *chord = chord.find_chord_closest_to(&first);
        }
    }
    if spec.normalize_chords {
        for chord in chords.iter_mut() {
            *chord = chord.normalize();
        }
    }

    let timeline = assemble_timeline(pattern, &atoms, &chords, structure)?;
    let harmony = Harmony::from_timeline(&timeline, structure.total_ticks())?;
    debug!(
        "harmony: pattern '{}', {} chord runs, {} sections",
        pattern,
        harmony.runs.len(),
        harmony.section_count()
    );
    Ok(harmony)
}

fn parse_random_tables(spec: &ChordPatternSpec) -> Result<Vec<Vec<Chord>>, EngineError> {
    spec.chord_random_tables
        .iter()
        .map(|table| {
            table
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| Chord::from_name(name, spec.crossover_pitch))
                .collect()
        })
        .collect()
}

/// Resolve the flattened atom list into concrete chords.
///
/// Table draws retry until the candidate differs (equal-normalized) from the
/// previous chord, from the referenced chord for `k!r`, and at the last
/// position from the first chord. Exhausted draws restart the whole pattern.
fn resolve_atoms(
    pattern: &str,
    atoms: &[ChordAtom],
    tables: &[Vec<Chord>],
    crossover_pitch: i32,
    rng: &mut Pcg32,
) -> Result<Vec<Chord>, EngineError> {
    'restart: for _ in 0..MAX_RESTARTS {
        let mut emitted: Vec<Chord> = Vec::with_capacity(atoms.len());
        for (index, atom) in atoms.iter().enumerate() {
            let is_last = index == atoms.len() - 1;
            let chord = match &atom.spec {
                ChordSpec::Name(name) => {
                    Chord::from_name(name, crossover_pitch)?.transpose(atom.transpose)
                }
                ChordSpec::Pitches(p1, p2, p3) => {
                    Chord::new(*p1, *p2, *p3)?.transpose(atom.transpose)
                }
                ChordSpec::BackReference(r) => {
                    let referenced =
                        emitted
                            .get(*r)
                            .copied()
                            .ok_or_else(|| EngineError::BackReference {
                                pattern: pattern.to_string(),
                                index: *r,
                                emitted: emitted.len(),
                            })?;
                    referenced.transpose(atom.transpose)
                }
                ChordSpec::Table(table) | ChordSpec::TableNot { table, .. } => {
                    let exclude = match &atom.spec {
                        ChordSpec::TableNot { not, .. } => {
                            Some(emitted.get(*not).copied().ok_or_else(|| {
                                EngineError::BackReference {
                                    pattern: pattern.to_string(),
                                    index: *not,
                                    emitted: emitted.len(),
                                }
                            })?)
                        }
                        _ => None,
                    };
                    let candidates =
                        tables
                            .get(*table)
                            .ok_or_else(|| EngineError::UnknownRandomTable {
                                pattern: pattern.to_string(),
                                table: *table,
                            })?;
                    if candidates.is_empty() {
                        return Err(EngineError::UnknownRandomTable {
                            pattern: pattern.to_string(),
                            table: *table,
                        });
                    }
                    match draw_chord(candidates, &emitted, exclude, is_last, atom.transpose, rng) {
                        Some(chord) => chord,
                        None => continue 'restart,
                    }
                }
            };
            emitted.push(chord);
        }
        return Ok(emitted);
    }
    let table = atoms
        .iter()
        .find_map(|a| match a.spec {
            ChordSpec::Table(t) | ChordSpec::TableNot { table: t, .. } => Some(t),
            _ => None,
        })
        .unwrap_or(0);
    Err(EngineError::ChordConstraint {
        table,
        attempts: MAX_RESTARTS,
    })
}

fn draw_chord(
    candidates: &[Chord],
    emitted: &[Chord],
    exclude: Option<Chord>,
    is_last: bool,
    transpose: i32,
    rng: &mut Pcg32,
) -> Option<Chord> {
    for _ in 0..MAX_DRAW_TRIES {
        let chord = candidates[rng.gen_range(0..candidates.len())].transpose(transpose);
        if let Some(previous) = emitted.last() {
            if chord.is_equal_normalized(previous) {
                continue;
            }
        }
        if is_last && !emitted.is_empty() && chord.is_equal_normalized(&emitted[0]) {
            continue;
        }
        if let Some(excluded) = exclude {
            if chord.is_equal_normalized(&excluded) {
                continue;
            }
        }
        return Some(chord);
    }
    None
}

/// Replicate resolved chords across their tick lengths, cycling the pattern
/// until the song is covered.
fn assemble_timeline(
    pattern: &str,
    atoms: &[ChordAtom],
    chords: &[Chord],
    structure: &Structure,
) -> Result<Vec<(Chord, usize, bool)>, EngineError> {
    let ticks_per_beat = structure.ticks_per_beat as f64;
    let mut entry_ticks = Vec::with_capacity(atoms.len());
    let mut pattern_ticks = 0usize;
    for atom in atoms {
        let ticks = (atom.beats * ticks_per_beat).round() as usize;
        if ticks == 0 {
            return Err(EngineError::ChordPatternSyntax {
                pattern: pattern.to_string(),
                message: format!("atom length {} beats rounds to zero ticks", atom.beats),
            });
        }
        entry_ticks.push(ticks);
        pattern_ticks += ticks;
    }
    let total = structure.total_ticks();
    if total % pattern_ticks != 0 {
        return Err(EngineError::ChordPatternSyntax {
            pattern: pattern.to_string(),
            message: format!(
                "pattern covers {} ticks which does not divide the song's {}",
                pattern_ticks, total
            ),
        });
    }
    let cycles = total / pattern_ticks;
    let mut timeline = Vec::with_capacity(atoms.len() * cycles);
    for _ in 0..cycles {
        for ((atom, chord), ticks) in atoms.iter().zip(chords).zip(&entry_ticks) {
            timeline.push((*chord, *ticks, atom.new_section));
        }
    }
    Ok(timeline)
}
