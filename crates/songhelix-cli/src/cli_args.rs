//! CLI argument definitions.

use clap::Parser;

/// songhelix - algorithmic song generation and real-time MIDI playback.
#[derive(Debug, Parser)]
#[command(name = "songhelix")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Song document to load (JSON file path).
    pub document: Option<String>,

    /// Generate a specific song: a name, or `seed:<n>` for a raw seed.
    #[arg(short = 's', long = "song-name")]
    pub song_name: Option<String>,

    /// List the available MIDI output ports and exit.
    #[arg(short = 'm', long = "show-midi-devices")]
    pub show_midi_devices: bool,
}

/// What `--song-name` resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum SongSelector {
    /// Seed derived from the name, name kept for display.
    Name(String),
    /// Raw 64-bit seed.
    Seed(u64),
}

impl SongSelector {
    /// Parse the `--song-name` argument.
    pub fn parse(value: &str) -> Result<Self, String> {
        if let Some(seed) = value.strip_prefix("seed:") {
            let seed: u64 = seed
                .parse()
                .map_err(|_| format!("invalid seed in '{}'", value))?;
            return Ok(SongSelector::Seed(seed));
        }
        if value.is_empty() {
            return Err("song name cannot be empty".to_string());
        }
        Ok(SongSelector::Name(value.to_string()))
    }

    /// The generation seed this selector pins down.
    pub fn seed(&self) -> u64 {
        match self {
            SongSelector::Seed(seed) => *seed,
            SongSelector::Name(name) => {
                let hash = blake3::hash(name.as_bytes());
                u64::from_le_bytes(hash.as_bytes()[0..8].try_into().unwrap())
            }
        }
    }

    /// The display name, if one was given.
    pub fn name(&self) -> Option<&str> {
        match self {
            SongSelector::Name(name) => Some(name),
            SongSelector::Seed(_) => None,
        }
    }
}
