//! Error types for MIDI playback.

use thiserror::Error;

/// Errors that can occur while opening devices or playing a song.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("player misconfigured: {message}")]
    Config { message: String },
    #[error("no MIDI port matches any candidate of device '{device}' (candidates {candidates:?}, available {available:?})")]
    DeviceUnavailable {
        device: String,
        candidates: Vec<String>,
        available: Vec<String>,
    },
    #[error("clock synchronization requires 24 % ticks_per_beat == 0, got {ticks_per_beat}")]
    ClockDivision { ticks_per_beat: u32 },
    #[error("instrument '{instrument}' has no device channel mapping")]
    MissingInstrumentMapping { instrument: String },
    #[error("player is already open")]
    AlreadyOpen,
    #[error("player is not open")]
    NotOpen,
    #[error("MIDI send failed on device '{device}': {message}")]
    Send { device: String, message: String },
    #[error("skip target '{target}' is invalid: {message}")]
    InvalidSkip { target: String, message: String },
    #[error("MIDI file write failed: {0}")]
    MidiFile(#[from] std::io::Error),
}
