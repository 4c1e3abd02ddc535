//! songhelix CLI - generate songs from a document and play them over MIDI.

mod cli_args;
mod run;

use std::path::Path;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use colored::Colorize;

use cli_args::{Cli, SongSelector};
use songhelix_player::MidirSink;
use songhelix_spec::song::SongDocument;

fn main() -> ExitCode {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{}", e);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprint!("{}", e);
            return ExitCode::from(1);
        }
    };

    if cli.show_midi_devices {
        return match MidirSink::available_ports() {
            Ok(ports) if ports.is_empty() => {
                println!("no MIDI output ports available");
                ExitCode::SUCCESS
            }
            Ok(ports) => {
                for port in ports {
                    println!("{}", port);
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", e.to_string().red());
                ExitCode::from(2)
            }
        };
    }

    let Some(document_path) = &cli.document else {
        eprintln!("{}", "no song document given (see --help)".red());
        return ExitCode::from(1);
    };
    let selector = match cli.song_name.as_deref().map(SongSelector::parse) {
        Some(Ok(selector)) => Some(selector),
        Some(Err(message)) => {
            eprintln!("{}", message.red());
            return ExitCode::from(1);
        }
        None => None,
    };

    let document = match SongDocument::from_path(Path::new(document_path)) {
        Ok(document) => document,
        Err(e) => {
            eprintln!("{}", e.to_string().red());
            return ExitCode::from(1);
        }
    };

    match run::run(document, selector) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", format!("{:#}", e).red());
            ExitCode::from(2)
        }
    }
}
