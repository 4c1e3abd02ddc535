//! External MIDI synchronization input.
//!
//! An optional input device feeds TIMING_CLOCK, START, CONTINUE, and STOP
//! into the scheduler: clock pulses drive a tempo follower that updates the
//! shared milli-BPM, START/CONTINUE resume and STOP pauses playback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use midir::{MidiInput, MidiInputConnection};

use songhelix_spec::player::SyncSpec;

use crate::error::PlayerError;
use crate::message;
use crate::scheduler::Shared;

/// Smoothing factor of the tempo follower's moving average.
const TEMPO_SMOOTHING: f64 = 0.1;

struct FollowerState {
    last_clock: Option<Instant>,
    interval_ns: f64,
}

/// The open synchronization input.
pub struct ExternalSync {
    running: Arc<AtomicBool>,
    started: Arc<AtomicBool>,
    wait_for_start: bool,
    // Dropping the connection closes the port.
    _connection: MidiInputConnection<()>,
}

impl ExternalSync {
    /// Connect to the first input port matching a candidate.
    pub fn open(spec: &SyncSpec, shared: Arc<Shared>) -> Result<Self, PlayerError> {
        let input = MidiInput::new("songhelix-sync").map_err(|e| PlayerError::Config {
            message: format!("could not create MIDI input: {}", e),
        })?;
        let ports = input.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|p| input.port_name(p).unwrap_or_default())
            .collect();
        let index = spec
            .candidates
            .iter()
            .find_map(|candidate| names.iter().position(|name| name.contains(candidate)))
            .ok_or_else(|| PlayerError::DeviceUnavailable {
                device: "synchronization".to_string(),
                candidates: spec.candidates.clone(),
                available: names.clone(),
            })?;

        let running = Arc::new(AtomicBool::new(!spec.wait_for_start));
        let started = Arc::new(AtomicBool::new(!spec.wait_for_start));
        let follower = Mutex::new(FollowerState {
            last_clock: None,
            interval_ns: 0.0,
        });
        let callback_running = running.clone();
        let callback_started = started.clone();
        let connection = input
            .connect(
                &ports[index],
                "songhelix-sync-in",
                move |_, bytes, _| {
                    let Some(&status) = bytes.first() else {
                        return;
                    };
                    match status {
                        message::TIMING_CLOCK => {
                            let mut state = follower.lock().unwrap();
                            let now = Instant::now();
                            if let Some(last) = state.last_clock {
                                let interval = now.duration_since(last).as_nanos() as f64;
                                state.interval_ns = if state.interval_ns == 0.0 {
                                    interval
                                } else {
                                    state.interval_ns * (1.0 - TEMPO_SMOOTHING)
                                        + interval * TEMPO_SMOOTHING
                                };
                                if state.interval_ns > 0.0 {
                                    // 24 clocks per beat.
                                    let milli_bpm =
                                        (2.5e12 / state.interval_ns).round() as u32;
                                    shared.set_milli_bpm(milli_bpm.clamp(1_000, 100_000_000));
                                }
                            }
                            state.last_clock = Some(now);
                        }
                        message::START | message::CONTINUE => {
                            callback_started.store(true, Ordering::Relaxed);
                            callback_running.store(true, Ordering::Relaxed);
                        }
                        message::STOP => {
                            callback_running.store(false, Ordering::Relaxed);
                        }
                        _ => {}
                    }
                },
                (),
            )
            .map_err(|e| PlayerError::Config {
                message: format!("could not connect synchronization input: {}", e),
            })?;
        log::info!("synchronization input connected to '{}'", names[index]);

        Ok(ExternalSync {
            running,
            started,
            wait_for_start: spec.wait_for_start,
            _connection: connection,
        })
    }

    /// Whether playback should proceed (no STOP pending).
    pub fn running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Block until START arrives (when configured), checking the abort flag.
    pub fn wait_for_start(&self, abort: &AtomicBool) {
        if !self.wait_for_start {
            return;
        }
        while !self.started.load(Ordering::Relaxed) && !abort.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
