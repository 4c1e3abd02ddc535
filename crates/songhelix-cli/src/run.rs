//! The generate-and-play pipeline.
//!
//! A generator thread produces songs into a bounded handoff of capacity
//! one; the main thread plays them; a console thread applies remote
//! commands to the running player.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use log::{error, info};

use songhelix_engine::arrange::generate_song;
use songhelix_engine::song::SongContext;
use songhelix_player::console::{help_text, parse_command, RemoteCommand};
use songhelix_player::scheduler::MidiPlayer;
use songhelix_player::write_midi_files;
use songhelix_spec::player::PlayerSpec;
use songhelix_spec::song::SongDocument;

use crate::cli_args::SongSelector;

/// Run the pipeline until the song ends (pinned song) or `quit` arrives.
pub fn run(document: SongDocument, selector: Option<SongSelector>) -> Result<()> {
    let PlayerSpec::Midi(midi_spec) = document.player.clone();
    let seed = selector
        .as_ref()
        .map(SongSelector::seed)
        .or(document.seed)
        .unwrap_or_else(rand::random);
    let name_override = selector
        .as_ref()
        .and_then(|s| s.name())
        .map(str::to_string);
    // A pinned song plays once; otherwise songs follow each other forever.
    let single = selector.is_some();

    let mut player =
        MidiPlayer::from_spec(&midi_spec, seed).context("player configuration")?;
    player.open().context("opening MIDI devices")?;
    let shared = player.shared();
    let quit = Arc::new(AtomicBool::new(false));

    let (sender, receiver) = std::sync::mpsc::sync_channel::<SongContext>(1);
    let generator = spawn_generator(
        document.clone(),
        seed,
        name_override,
        single,
        sender,
        quit.clone(),
    );
    // The console thread ends with stdin or on quit; never joined.
    let _console = spawn_console(shared.clone(), quit.clone());

    let result = play_songs(&mut player, &midi_spec, receiver, &quit, single);
    quit.store(true, Ordering::Relaxed);
    let close_result = player.close();
    let _ = generator.join();
    result?;
    close_result.context("closing MIDI devices")?;
    Ok(())
}

fn spawn_generator(
    document: SongDocument,
    first_seed: u64,
    name_override: Option<String>,
    single: bool,
    sender: SyncSender<SongContext>,
    quit: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut seed = first_seed;
        loop {
            if quit.load(Ordering::Relaxed) {
                return;
            }
            match generate_song(&document, Some(seed), name_override.clone()) {
                Ok(context) => {
                    // Blocks until the player takes the previous song.
                    if sender.send(context).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    error!("generation failed: {}", e);
                    return;
                }
            }
            if single {
                return;
            }
            seed = rand::random();
        }
    })
}

fn spawn_console(
    shared: Arc<songhelix_player::scheduler::Shared>,
    quit: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                return;
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Ok(RemoteCommand::Bpm(milli_bpm)) => shared.set_milli_bpm(milli_bpm),
                Ok(RemoteCommand::Transposition(semitones)) => {
                    shared.set_transposition(semitones)
                }
                Ok(RemoteCommand::Groove(weights)) => {
                    if let Err(e) = shared.set_groove(weights) {
                        eprintln!("{}", e.to_string().red());
                    }
                }
                Ok(RemoteCommand::Skip(target)) => shared.request_skip(target),
                Ok(RemoteCommand::Help) => println!("{}", help_text()),
                Ok(RemoteCommand::Quit) => {
                    quit.store(true, Ordering::Relaxed);
                    shared.abort_play();
                    return;
                }
                Err(e) => eprintln!("{}", e.to_string().red()),
            }
        }
    })
}

fn play_songs(
    player: &mut MidiPlayer,
    midi_spec: &songhelix_spec::player::MidiPlayerSpec,
    receiver: Receiver<SongContext>,
    quit: &AtomicBool,
    single: bool,
) -> Result<()> {
    loop {
        if quit.load(Ordering::Relaxed) {
            return Ok(());
        }
        let Ok(context) = receiver.recv() else {
            return Ok(());
        };
        println!(
            "{} {} {}",
            "playing".green().bold(),
            context.song_name.bold(),
            format!("(seed {})", context.seed).dimmed()
        );
        let transposition = player.shared().transposition();
        write_midi_files(&context, midi_spec, player.milli_bpm(), transposition)
            .context("writing MIDI files")?;
        player.play(&context).context("playback")?;
        info!("finished '{}'", context.song_name);
        if single {
            return Ok(());
        }
    }
}
