//! songhelix real-time MIDI player.
//!
//! Takes a generated [`songhelix_engine::song::SongContext`] and plays it
//! through one or more MIDI output devices with sample-accurate timing: a
//! two-deadline cooperative scheduler emits note events, controller LFO
//! updates, and 24-PPQN clock pulses against a monotonic clock, applying a
//! groove curve and clean abort/mute semantics.
//!
//! # Modules
//!
//! - [`scheduler`]: the player and its main loop
//! - [`backend`]: the device seam (midir and in-memory capture)
//! - [`message`]: raw MIDI message construction
//! - [`lfo`]: controller LFOs
//! - [`sync`]: external clock synchronization input
//! - [`midifile`]: standard MIDI file export
//! - [`console`]: textual remote-control command parsing

pub mod backend;
pub mod console;
pub mod error;
pub mod lfo;
pub mod message;
pub mod midifile;
pub mod scheduler;
pub mod sync;

pub use backend::{CaptureSink, MidiSink, MidirSink};
pub use console::{help_text, parse_command, parse_skip, RemoteCommand};
pub use error::PlayerError;
pub use lfo::{parse_controller, ControllerLfo, ControllerTarget};
pub use midifile::write_midi_files;
pub use scheduler::{groove_tick_ns, MidiPlayer, SkipTarget};
