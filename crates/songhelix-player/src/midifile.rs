//! Standard MIDI file export.
//!
//! One SMF per configured device, written between generation and playback.
//! The path template substitutes `${name}` (song name) and `${device}`.

use std::path::PathBuf;

use log::info;
use midly::{
    num::{u15, u24, u28, u4, u7},
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
};

use songhelix_engine::sequence::{SequenceEntry, TrackKind};
use songhelix_engine::song::SongContext;
use songhelix_spec::player::MidiPlayerSpec;

use crate::error::PlayerError;

/// Write one MIDI file per device; returns the written paths.
/// A missing template disables export.
pub fn write_midi_files(
    context: &SongContext,
    spec: &MidiPlayerSpec,
    milli_bpm: u32,
    transposition: i32,
) -> Result<Vec<PathBuf>, PlayerError> {
    let Some(template) = &spec.midi_file_template else {
        return Ok(Vec::new());
    };
    let mut written = Vec::new();
    for device in &spec.devices {
        let smf = build_smf(context, spec, &device.name, milli_bpm, transposition)?;
        if smf.tracks.len() <= 1 {
            continue;
        }
        let path = PathBuf::from(
            template
                .replace("${name}", &context.song_name)
                .replace("${device}", &device.name),
        );
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        smf.save(&path)?;
        info!("wrote MIDI file {}", path.display());
        written.push(path);
    }
    Ok(written)
}

/// Build the SMF for one device: a tempo track plus one track per
/// instrument bound to that device.
fn build_smf<'a>(
    context: &'a SongContext,
    spec: &MidiPlayerSpec,
    device: &str,
    milli_bpm: u32,
    transposition: i32,
) -> Result<Smf<'a>, PlayerError> {
    let ticks_per_beat = context.structure.ticks_per_beat as u16;
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(ticks_per_beat)),
    ));

    // Microseconds per beat from thousandths of BPM.
    let tempo = (60_000_000_000u64 / milli_bpm as u64) as u32;
    smf.tracks.push(vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo))),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ]);

    for entry in context.arrangement.entries() {
        let Some(binding) = spec.instruments.get(&entry.instrument) else {
            return Err(PlayerError::MissingInstrumentMapping {
                instrument: entry.instrument.clone(),
            });
        };
        if binding.device != device {
            continue;
        }
        let channel = u4::new(binding.channel & 0x0F);
        let track_transposition = match entry.track.kind {
            TrackKind::Melodic => transposition,
            TrackKind::Rhythm => 0,
        };

        // Absolute (tick, order, message) events; note-offs sort first.
        let mut events: Vec<(u64, u8, MidiMessage)> = Vec::new();
        if binding.program >= 0 {
            events.push((
                0,
                0,
                MidiMessage::ProgramChange {
                    program: u7::new(binding.program as u8),
                },
            ));
        }
        for sequence in &entry.track.sequences {
            let mut tick = 0u64;
            for seq_entry in sequence.entries() {
                if let SequenceEntry::Note {
                    pitch,
                    velocity,
                    ticks,
                    ..
                } = *seq_entry
                {
                    let key = u7::new((pitch + track_transposition).clamp(0, 127) as u8);
                    events.push((
                        tick,
                        2,
                        MidiMessage::NoteOn {
                            key,
                            vel: u7::new(velocity),
                        },
                    ));
                    events.push((
                        tick + ticks as u64,
                        1,
                        MidiMessage::NoteOff {
                            key,
                            vel: u7::new(0),
                        },
                    ));
                }
                tick += seq_entry.ticks() as u64;
            }
        }
        events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut track = vec![TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(entry.instrument.as_bytes())),
        }];
        let mut last_tick = 0u64;
        for (tick, _, message) in events {
            track.push(TrackEvent {
                delta: u28::new((tick - last_tick) as u32),
                kind: TrackEventKind::Midi { channel, message },
            });
            last_tick = tick;
        }
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        smf.tracks.push(track);
    }
    Ok(smf)
}
