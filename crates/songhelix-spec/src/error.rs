//! Error types for song document loading and validation.

use thiserror::Error;

/// Errors raised while loading or validating a song document.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to parse song document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("document version '{version}' does not match supported version {supported}")]
    VersionMismatch { version: String, supported: u32 },
    #[error("invalid version range '{range}': {message}")]
    InvalidVersionRange { range: String, message: String },
    #[error("invalid random value in '{field}': {message}")]
    InvalidRandomValue { field: String, message: String },
    #[error("structure field '{field}' must be positive")]
    NonPositiveStructure { field: &'static str },
    #[error("track '{track}' references unknown activity vector '{name}'")]
    UnknownActivityVector { track: String, name: String },
    #[error("duplicate activity vector name '{name}'")]
    DuplicateActivityVector { name: String },
    #[error("instrument '{instrument}' has no device channel mapping")]
    MissingInstrumentMapping { instrument: String },
    #[error("device channel for '{instrument}' out of range: {message}")]
    InvalidDeviceChannel { instrument: String, message: String },
    #[error("document has no tracks")]
    NoTracks,
    #[error("io error reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
