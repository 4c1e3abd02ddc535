//! Error types for song generation.

use thiserror::Error;

/// Errors that can occur during song generation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown chord '{name}'")]
    UnknownChord { name: String },
    #[error("chord pitches must be three distinct values, got {p1}:{p2}:{p3}")]
    DegenerateChord { p1: i32, p2: i32, p3: i32 },
    #[error("back-reference ${index} out of range (only {emitted} chords emitted) in pattern '{pattern}'")]
    BackReference {
        pattern: String,
        index: usize,
        emitted: usize,
    },
    #[error("random table {table} referenced in pattern '{pattern}' does not exist")]
    UnknownRandomTable { pattern: String, table: usize },
    #[error("could not draw a distinct chord from table {table} after {attempts} restarts")]
    ChordConstraint { table: usize, attempts: usize },
    #[error("invalid chord pattern '{pattern}': {message}")]
    ChordPatternSyntax { pattern: String, message: String },
    #[error("invalid pattern string '{pattern}': {message}")]
    PatternSyntax { pattern: String, message: String },
    #[error("pattern ticks per beat {pattern_tpb} does not divide target {target_tpb}")]
    TicksPerBeatMismatch { pattern_tpb: u32, target_tpb: u32 },
    #[error("could not reach target length {target} from the given fragments after {attempts} attempts")]
    PatternLength { target: u32, attempts: u32 },
    #[error("harmony sanity check failed at tick {tick}: {message}")]
    HarmonySanity { tick: usize, message: String },
    #[error("activity solver exceeded {max_iterations} iterations")]
    ConstraintUnsatisfiable {
        max_iterations: u64,
        /// Failure counts per (voice, reason), for diagnostics.
        failures: Vec<(String, String, u64)>,
    },
    #[error("activity constraints are infeasible for voice '{voice}': {message}")]
    InfeasibleConstraint { voice: String, message: String },
    #[error("unknown activity vector '{name}'")]
    UnknownActivityVector { name: String },
    #[error("no melody pitch found within {max_iterations} iterations")]
    MelodyPitchSearch { max_iterations: u32 },
    #[error("invalid condition expression '{expression}': {message}")]
    ConditionSyntax { expression: String, message: String },
    #[error("drum rule {rule} references voice index {index} but only {voices} voices exist")]
    UnknownDrumVoice {
        rule: usize,
        index: usize,
        voices: usize,
    },
    #[error("sequence engine misconfigured: {message}")]
    SequencerConfig { message: String },
    #[error(transparent)]
    Spec(#[from] songhelix_spec::SpecError),
}
