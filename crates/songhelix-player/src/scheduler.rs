//! The real-time MIDI scheduler.
//!
//! A single-threaded cooperative loop drives two nanosecond deadlines: the
//! next note tick (groove-timed) and the next clock pulse (24 PPQN,
//! groove-independent). Whichever fires first emits its work and advances.
//! Tempo and the abort flag are atomics writable from other threads; no lock
//! is taken on the hot path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, info};
use rand::Rng;

use songhelix_engine::sequence::{SequenceEntry, TrackKind};
use songhelix_engine::song::SongContext;
use songhelix_spec::player::{LegatoControllerSpec, MidiPlayerSpec, RotationUnit};
use songhelix_spec::seed::rng_for;

use crate::backend::{MidiSink, MidirSink};
use crate::error::PlayerError;
use crate::lfo::{ControllerLfo, ControllerTarget};
use crate::message;
use crate::sync::ExternalSync;

/// Settle delay after a full mute, letting reverb/release tails decay.
const MUTE_SETTLE: Duration = Duration::from_millis(460);

/// Granularity of abort-aware sleeping.
const SLEEP_SLICE: Duration = Duration::from_millis(1);

/// Where to resume after a skip.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipTarget {
    /// Absolute tick.
    Tick(u64),
    /// Percentage of the song.
    Percent(f64),
    /// Chord section index, fractional part into the section.
    Section(f64),
    /// The next chord section boundary.
    Next,
}

/// State shared with controlling threads.
pub struct Shared {
    milli_bpm: AtomicU32,
    transposition: AtomicI32,
    abort: AtomicBool,
    skip: Mutex<Option<SkipTarget>>,
    groove: Mutex<Vec<u32>>,
}

/// One open output device.
struct Device {
    name: String,
    sink: Box<dyn MidiSink>,
    clock_sync: bool,
}

/// Resolved instrument binding.
#[derive(Debug, Clone)]
struct Binding {
    device: usize,
    channel: u8,
    program: i16,
    legato_controller: Option<LegatoControllerSpec>,
}

/// Playback cursor for one sequence of one instrument.
struct Voice {
    binding: Binding,
    melodic: bool,
    /// Index into the arrangement entry's sequences.
    track_index: usize,
    sequence_index: usize,
    entry_index: usize,
    /// Tick at which the current entry starts.
    entry_start: u64,
    /// The sounding note: sent pitch, end tick, legato flag.
    sounding: Option<(u8, u64, bool)>,
    /// NOTE_OFF deferred past the next NOTE_ON.
    deferred_off: Option<u8>,
}

/// The MIDI player.
pub struct MidiPlayer {
    spec: MidiPlayerSpec,
    seed: u64,
    bindings: HashMap<String, Binding>,
    devices: Option<Vec<Device>>,
    sync: Option<ExternalSync>,
    shared: Arc<Shared>,
}

impl MidiPlayer {
    /// Build a player from configuration, resolving templated values.
    pub fn from_spec(spec: &MidiPlayerSpec, seed: u64) -> Result<Self, PlayerError> {
        let mut rng = rng_for(seed, "player", spec.seed, spec.salt);
        let milli_bpm = spec
            .milli_bpm
            .resolve("milli_bpm", &mut rng)
            .map_err(|e| PlayerError::Config {
                message: e.to_string(),
            })?;
        let transposition = spec
            .transposition
            .resolve("transposition", &mut rng)
            .map_err(|e| PlayerError::Config {
                message: e.to_string(),
            })?;
        if milli_bpm <= 0 {
            return Err(PlayerError::Config {
                message: format!("milli_bpm resolved to non-positive {}", milli_bpm),
            });
        }
        if spec.groove.is_empty() || spec.groove.iter().any(|&g| g == 0) {
            return Err(PlayerError::Config {
                message: "groove must be a non-empty list of positive integers".to_string(),
            });
        }

        let mut bindings = HashMap::new();
        for (instrument, channel_spec) in &spec.instruments {
            let device = spec
                .devices
                .iter()
                .position(|d| d.name == channel_spec.device)
                .ok_or_else(|| PlayerError::Config {
                    message: format!(
                        "instrument '{}' references unknown device '{}'",
                        instrument, channel_spec.device
                    ),
                })?;
            bindings.insert(
                instrument.clone(),
                Binding {
                    device,
                    channel: channel_spec.channel & 0x0F,
                    program: channel_spec.program,
                    legato_controller: channel_spec.legato_controller.clone(),
                },
            );
        }

        Ok(MidiPlayer {
            spec: spec.clone(),
            seed,
            bindings,
            devices: None,
            sync: None,
            shared: Arc::new(Shared {
                milli_bpm: AtomicU32::new(milli_bpm as u32),
                transposition: AtomicI32::new(transposition as i32),
                abort: AtomicBool::new(false),
                skip: Mutex::new(None),
                groove: Mutex::new(spec.groove.clone()),
            }),
        })
    }

    /// Open all configured devices through midir and set channel programs.
    pub fn open(&mut self) -> Result<(), PlayerError> {
        let sinks = self
            .spec
            .devices
            .iter()
            .map(|d| {
                MidirSink::connect(&d.name, &d.candidates)
                    .map(|sink| Box::new(sink) as Box<dyn MidiSink>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(sync_spec) = self.spec.synchronization.clone() {
            self.sync = Some(ExternalSync::open(&sync_spec, self.shared.clone())?);
        }
        self.open_with(sinks)
    }

    /// Open with explicit sinks, one per configured device (in order).
    /// Used by tests and dry runs in place of real ports.
    pub fn open_with(&mut self, sinks: Vec<Box<dyn MidiSink>>) -> Result<(), PlayerError> {
        if self.devices.is_some() {
            return Err(PlayerError::AlreadyOpen);
        }
        if sinks.len() != self.spec.devices.len() {
            return Err(PlayerError::Config {
                message: format!(
                    "{} sinks provided for {} devices",
                    sinks.len(),
                    self.spec.devices.len()
                ),
            });
        }
        let mut devices: Vec<Device> = self
            .spec
            .devices
            .iter()
            .zip(sinks)
            .map(|(d, sink)| Device {
                name: d.name.clone(),
                sink,
                clock_sync: d.clock_synchronization,
            })
            .collect();
        // Programs are channel state; set them once at open.
        for binding in self.bindings.values() {
            if binding.program >= 0 {
                devices[binding.device].sink.send(&message::program_change(
                    binding.channel,
                    binding.program as u8,
                ))?;
            }
        }
        self.devices = Some(devices);
        Ok(())
    }

    /// Whether `open` has succeeded and `close` has not run.
    pub fn is_open(&self) -> bool {
        self.devices.is_some()
    }

    /// Shared state handle for remote-control threads.
    pub fn shared(&self) -> Arc<Shared> {
        self.shared.clone()
    }

    /// Tempo in thousandths of BPM.
    pub fn milli_bpm(&self) -> u32 {
        self.shared.milli_bpm.load(Ordering::Relaxed)
    }

    /// Set the tempo.
    pub fn set_milli_bpm(&self, milli_bpm: u32) {
        self.shared.set_milli_bpm(milli_bpm);
    }

    /// Request a cooperative abort.
    pub fn abort_play(&self) {
        self.shared.abort_play();
    }

    /// Play a generated song to completion (or until abort).
    pub fn play(&mut self, context: &SongContext) -> Result<(), PlayerError> {
        if self.devices.is_none() {
            return Err(PlayerError::NotOpen);
        }
        let ticks_per_beat = context.structure.ticks_per_beat;
        let needs_clock = self.spec.devices.iter().any(|d| d.clock_synchronization);
        if needs_clock && 24 % ticks_per_beat != 0 {
            return Err(PlayerError::ClockDivision { ticks_per_beat });
        }

        let mut voices = self.build_voices(context)?;
        let mut lfos = self.build_lfos(context)?;
        let total = context.structure.total_ticks() as u64;

        if let Some(sync) = &self.sync {
            sync.wait_for_start(&self.shared.abort);
        }

        // Clock pulses run from the very beginning of the before-wait.
        self.send_clock(message::START)?;
        let result = self.run_loop(context, &mut voices, &mut lfos, total);
        self.send_clock(message::STOP)?;
        if self.shared.abort.load(Ordering::Relaxed) {
            info!("playback aborted");
            self.mute_all()?;
        }
        result
    }

    /// Close the player: mute everything and release the devices.
    /// A second close is a no-op.
    pub fn close(&mut self) -> Result<(), PlayerError> {
        if self.devices.is_none() {
            return Ok(());
        }
        let result = self.mute_all();
        std::thread::sleep(MUTE_SETTLE);
        self.devices = None;
        self.sync = None;
        result
    }

    fn run_loop(
        &mut self,
        context: &SongContext,
        voices: &mut [Voice],
        lfos: &mut [ControllerLfo],
        total: u64,
    ) -> Result<(), PlayerError> {
        let ticks_per_beat = context.structure.ticks_per_beat;
        let needs_clock = self.spec.devices.iter().any(|d| d.clock_synchronization);
        let before = self.spec.before_play_wait_ticks as u64;
        let after = self.spec.after_play_wait_ticks as u64;

        let start = Instant::now();
        let mut slot = 0u64; // 0..before+total+after; musical tick = slot - before
        let mut tick_deadline = 0u64; // ns since start
        let mut clock_deadline = 0u64;

        loop {
            if self.shared.abort.load(Ordering::Relaxed) {
                return Ok(());
            }
            if let Some(sync) = &self.sync {
                if !sync.running() {
                    // External STOP: hold position until START/CONTINUE.
                    std::thread::sleep(SLEEP_SLICE);
                    continue;
                }
            }
            if slot >= before + total + after {
                // Final boundary: flush note-offs for notes ending at the
                // song end, including deferred legato releases.
                self.flush_voices(voices)?;
                return Ok(());
            }

            let next_deadline = if needs_clock {
                tick_deadline.min(clock_deadline)
            } else {
                tick_deadline
            };
            if !self.sleep_until(start, next_deadline) {
                return Ok(());
            }

            if needs_clock && clock_deadline <= tick_deadline {
                self.send_clock(message::TIMING_CLOCK)?;
                clock_deadline += self.clock_interval_ns();
                continue;
            }

            // A note tick.
            let skip_target = self.shared.skip.lock().unwrap().take();
            if let Some(target) = skip_target {
                if slot >= before && slot < before + total {
                    let tick = self.resolve_skip(&target, context, slot - before)?;
                    self.mute_all()?;
                    for voice in voices.iter_mut() {
                        reposition(voice, context, tick);
                    }
                    for lfo in lfos.iter_mut() {
                        lfo.last_sent = None;
                    }
                    slot = before + tick;
                    debug!("skipped to tick {}", tick);
                }
            }
            if slot >= before && slot < before + total {
                let tick = slot - before;
                self.emit_lfos(context, lfos, tick, start)?;
                self.emit_note_offs(voices, tick)?;
                self.emit_note_ons(context, voices, tick)?;
            }
            let musical_index = slot.saturating_sub(before);
            tick_deadline += self.tick_duration_ns(musical_index, ticks_per_beat);
            slot += 1;
        }
    }

    /// Sleep until `deadline` ns after `start`, slicing for abort checks.
    /// Returns false when aborted.
    fn sleep_until(&self, start: Instant, deadline_ns: u64) -> bool {
        loop {
            if self.shared.abort.load(Ordering::Relaxed) {
                return false;
            }
            let elapsed = start.elapsed().as_nanos() as u64;
            if elapsed >= deadline_ns {
                return true;
            }
            let remaining = Duration::from_nanos(deadline_ns - elapsed);
            std::thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }

    fn tick_duration_ns(&self, index: u64, ticks_per_beat: u32) -> u64 {
        let milli_bpm = self.shared.milli_bpm.load(Ordering::Relaxed);
        let groove = self.shared.groove.lock().unwrap();
        groove_tick_ns(&groove, index, ticks_per_beat, milli_bpm)
    }

    fn clock_interval_ns(&self) -> u64 {
        let milli_bpm = self.shared.milli_bpm.load(Ordering::Relaxed) as u64;
        60_000_000_000_000u64 / (milli_bpm * 24)
    }

    fn build_voices(&self, context: &SongContext) -> Result<Vec<Voice>, PlayerError> {
        let mut voices = Vec::new();
        for (track_index, entry) in context.arrangement.entries().iter().enumerate() {
            let binding = self.bindings.get(&entry.instrument).ok_or_else(|| {
                PlayerError::MissingInstrumentMapping {
                    instrument: entry.instrument.clone(),
                }
            })?;
            for (sequence_index, _) in entry.track.sequences.iter().enumerate() {
                voices.push(Voice {
                    binding: binding.clone(),
                    melodic: entry.track.kind == TrackKind::Melodic,
                    track_index,
                    sequence_index,
                    entry_index: 0,
                    entry_start: 0,
                    sounding: None,
                    deferred_off: None,
                });
            }
        }
        Ok(voices)
    }

    fn build_lfos(&self, context: &SongContext) -> Result<Vec<ControllerLfo>, PlayerError> {
        self.spec
            .lfos
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                let path = format!("lfo/{}", index);
                let mut rng = rng_for(self.seed, &path, spec.seed, spec.salt);
                let lfo_seed: u64 = rng.gen();
                let lfo = ControllerLfo::from_spec(spec, lfo_seed)?;
                if lfo.target != ControllerTarget::MilliBpm {
                    let instrument = lfo.instrument.as_deref().ok_or_else(|| {
                        PlayerError::Config {
                            message: format!("LFO {} needs an instrument", index),
                        }
                    })?;
                    if !self.bindings.contains_key(instrument) {
                        return Err(PlayerError::MissingInstrumentMapping {
                            instrument: instrument.to_string(),
                        });
                    }
                    if lfo.rotation_unit == RotationUnit::Activity
                        && context.arrangement.get(instrument).is_none()
                    {
                        return Err(PlayerError::Config {
                            message: format!(
                                "LFO {} rotates over activity of unarranged '{}'",
                                index, instrument
                            ),
                        });
                    }
                }
                Ok(lfo)
            })
            .collect()
    }

    fn emit_lfos(
        &mut self,
        context: &SongContext,
        lfos: &mut [ControllerLfo],
        tick: u64,
        start: Instant,
    ) -> Result<(), PlayerError> {
        let total = context.structure.total_ticks() as f64;
        let ticks_per_beat = context.structure.ticks_per_beat as f64;
        for lfo in lfos.iter_mut() {
            let phase = match lfo.rotation_unit {
                RotationUnit::Song => lfo.speed * tick as f64 / total,
                RotationUnit::Beat => lfo.speed * tick as f64 / ticks_per_beat,
                RotationUnit::Second => {
                    lfo.speed * start.elapsed().as_nanos() as f64 / 1_000_000_000.0
                }
                RotationUnit::Activity => {
                    let instrument = lfo.instrument.as_deref().unwrap_or_default();
                    let span = instrument_activity_span(context, instrument);
                    match span {
                        Some((first, last)) if last > first => {
                            lfo.speed * (tick as f64 - first as f64) / (last - first) as f64
                        }
                        _ => 0.0,
                    }
                }
            };
            let value = lfo.value_at(phase);
            if lfo.last_sent == Some(value) && tick != 0 {
                continue;
            }
            lfo.last_sent = Some(value);
            match lfo.target {
                ControllerTarget::MilliBpm => {
                    self.shared.set_milli_bpm(value.max(1) as u32);
                }
                ControllerTarget::PitchBend => {
                    let binding = self.bindings[lfo.instrument.as_deref().unwrap()].clone();
                    let bend = value.clamp(0, 16383) as u16;
                    self.send_to(binding.device, &message::pitch_bend(binding.channel, bend))?;
                }
                ControllerTarget::Controller(cc) => {
                    let binding = self.bindings[lfo.instrument.as_deref().unwrap()].clone();
                    let msg =
                        message::control_change(binding.channel, cc, value.clamp(0, 127) as u8);
                    self.send_to(binding.device, &msg)?;
                }
            }
        }
        Ok(())
    }

    fn emit_note_offs(&mut self, voices: &mut [Voice], tick: u64) -> Result<(), PlayerError> {
        for voice in voices.iter_mut() {
            let Some((pitch, end, legato)) = voice.sounding else {
                continue;
            };
            if end != tick {
                continue;
            }
            voice.sounding = None;
            if legato {
                // Released after the next NOTE_ON of this voice.
                voice.deferred_off = Some(pitch);
            } else {
                let msg = message::note_off(voice.binding.channel, pitch);
                self.send_to(voice.binding.device, &msg)?;
            }
        }
        Ok(())
    }

    fn emit_note_ons(
        &mut self,
        context: &SongContext,
        voices: &mut [Voice],
        tick: u64,
    ) -> Result<(), PlayerError> {
        let transposition = self.shared.transposition.load(Ordering::Relaxed);
        for voice in voices.iter_mut() {
            let sequence =
                &context.arrangement.entries()[voice.track_index].track.sequences
                    [voice.sequence_index];
            let entries = sequence.entries();
            // Advance past entries that end at or before this tick.
            while voice.entry_index < entries.len() {
                let len = entries[voice.entry_index].ticks() as u64;
                if voice.entry_start + len <= tick {
                    voice.entry_start += len;
                    voice.entry_index += 1;
                } else {
                    break;
                }
            }
            if voice.entry_index >= entries.len() || voice.entry_start != tick {
                continue;
            }
            let entry = &entries[voice.entry_index];
            let SequenceEntry::Note {
                pitch,
                velocity,
                ticks,
                ..
            } = *entry
            else {
                continue;
            };
            let legato = sequence.is_legato_at(voice.entry_index);
            let sent_pitch = (pitch + if voice.melodic { transposition } else { 0 })
                .clamp(0, 127) as u8;

            let legato_cc = voice.binding.legato_controller.clone();
            if let (Some(cc), Some(_)) = (&legato_cc, voice.deferred_off) {
                self.send_to(
                    voice.binding.device,
                    &message::control_change(voice.binding.channel, cc.controller, cc.on_value),
                )?;
            }
            // Same-pitch legato: the deferred release would kill the new
            // note, so it is dropped; the controller "off" still follows.
            let deferred = voice.deferred_off.take();
            self.send_to(
                voice.binding.device,
                &message::note_on(voice.binding.channel, sent_pitch, velocity),
            )?;
            if let Some(old_pitch) = deferred {
                if old_pitch != sent_pitch {
                    self.send_to(
                        voice.binding.device,
                        &message::note_off(voice.binding.channel, old_pitch),
                    )?;
                }
                if let Some(cc) = &legato_cc {
                    self.send_to(
                        voice.binding.device,
                        &message::control_change(
                            voice.binding.channel,
                            cc.controller,
                            cc.off_value,
                        ),
                    )?;
                }
            }
            voice.sounding = Some((sent_pitch, tick + ticks as u64, legato));
        }
        Ok(())
    }

    /// Emit the releases still pending at the end of the song.
    fn flush_voices(&mut self, voices: &mut [Voice]) -> Result<(), PlayerError> {
        for voice in voices.iter_mut() {
            if let Some((pitch, _, _)) = voice.sounding.take() {
                let msg = message::note_off(voice.binding.channel, pitch);
                self.send_to(voice.binding.device, &msg)?;
            }
            if let Some(pitch) = voice.deferred_off.take() {
                let msg = message::note_off(voice.binding.channel, pitch);
                self.send_to(voice.binding.device, &msg)?;
                if let Some(cc) = voice.binding.legato_controller.clone() {
                    self.send_to(
                        voice.binding.device,
                        &message::control_change(
                            voice.binding.channel,
                            cc.controller,
                            cc.off_value,
                        ),
                    )?;
                }
            }
        }
        Ok(())
    }

    fn resolve_skip(
        &self,
        target: &SkipTarget,
        context: &SongContext,
        current: u64,
    ) -> Result<u64, PlayerError> {
        let total = context.structure.total_ticks() as u64;
        let tick = match target {
            SkipTarget::Tick(tick) => *tick,
            SkipTarget::Percent(pct) => (total as f64 * pct / 100.0) as u64,
            SkipTarget::Section(section) => {
                let boundaries = context.harmony.section_boundaries();
                let index = section.floor() as usize;
                if index >= boundaries.len() {
                    return Err(PlayerError::InvalidSkip {
                        target: format!("#{}", section),
                        message: format!("song has {} sections", boundaries.len()),
                    });
                }
                let (start, end) = context.harmony.section_range(index);
                start as u64 + ((end - start) as f64 * section.fract()) as u64
            }
            SkipTarget::Next => {
                let current = current as usize;
                context
                    .harmony
                    .section_boundaries()
                    .iter()
                    .find(|&&b| b > current)
                    .copied()
                    .unwrap_or(total as usize) as u64
            }
        };
        Ok(tick.min(total.saturating_sub(1)))
    }

    fn send_to(&mut self, device: usize, msg: &[u8]) -> Result<(), PlayerError> {
        let devices = self.devices.as_mut().ok_or(PlayerError::NotOpen)?;
        devices[device].sink.send(msg)
    }

    fn send_clock(&mut self, status: u8) -> Result<(), PlayerError> {
        let Some(devices) = self.devices.as_mut() else {
            return Ok(());
        };
        for device in devices.iter_mut().filter(|d| d.clock_sync) {
            device.sink.send(&[status])?;
        }
        Ok(())
    }

    /// Mute every bound channel: ALL SOUND OFF, ALL NOTES OFF, and an
    /// explicit NOTE_OFF for all 128 pitches.
    fn mute_all(&mut self) -> Result<(), PlayerError> {
        let mut channels: Vec<(usize, u8)> = self
            .bindings
            .values()
            .map(|b| (b.device, b.channel))
            .collect();
        channels.sort_unstable();
        channels.dedup();
        for (device, channel) in channels {
            self.send_to(device, &message::control_change(channel, message::CC_ALL_SOUND_OFF, 0))?;
            self.send_to(device, &message::control_change(channel, message::CC_ALL_NOTES_OFF, 0))?;
            for pitch in 0..=127u8 {
                self.send_to(device, &message::note_off(channel, pitch))?;
            }
        }
        Ok(())
    }
}

impl Shared {
    /// Set the tempo, in thousandths of BPM.
    pub fn set_milli_bpm(&self, milli_bpm: u32) {
        self.milli_bpm.store(milli_bpm.max(1), Ordering::Relaxed);
    }

    /// Tempo in thousandths of BPM.
    pub fn milli_bpm(&self) -> u32 {
        self.milli_bpm.load(Ordering::Relaxed)
    }

    /// Set the global melodic transposition.
    pub fn set_transposition(&self, transposition: i32) {
        self.transposition.store(transposition, Ordering::Relaxed);
    }

    /// The global melodic transposition.
    pub fn transposition(&self) -> i32 {
        self.transposition.load(Ordering::Relaxed)
    }

    /// Replace the groove weights.
    pub fn set_groove(&self, groove: Vec<u32>) -> Result<(), PlayerError> {
        if groove.is_empty() || groove.iter().any(|&g| g == 0) {
            return Err(PlayerError::Config {
                message: "groove must be a non-empty list of positive integers".to_string(),
            });
        }
        *self.groove.lock().unwrap() = groove;
        Ok(())
    }

    /// Request a skip.
    pub fn request_skip(&self, target: SkipTarget) {
        *self.skip.lock().unwrap() = Some(target);
    }

    /// Request a cooperative abort.
    pub fn abort_play(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }
}

/// Groove-weighted duration of tick `index` in nanoseconds.
///
/// Each groove period of `len` ticks sums exactly to `len` non-grooved
/// ticks; the period's last element absorbs the division rounding.
pub fn groove_tick_ns(groove: &[u32], index: u64, ticks_per_beat: u32, milli_bpm: u32) -> u64 {
    let base = 60_000_000_000_000u64 / (milli_bpm as u64 * ticks_per_beat as u64);
    let len = groove.len() as u64;
    if len <= 1 {
        return base;
    }
    let sum: u64 = groove.iter().map(|&g| g as u64).sum();
    let k = (index % len) as usize;
    let period = base * len;
    let weighted = |i: usize| period * groove[i] as u64 / sum;
    if k == groove.len() - 1 {
        let consumed: u64 = (0..k).map(weighted).sum();
        period - consumed
    } else {
        weighted(k)
    }
}

/// Reposition a voice's cursor at an absolute tick.
fn reposition(voice: &mut Voice, context: &SongContext, tick: u64) {
    let sequence =
        &context.arrangement.entries()[voice.track_index].track.sequences[voice.sequence_index];
    voice.sounding = None;
    voice.deferred_off = None;
    voice.entry_index = 0;
    voice.entry_start = 0;
    for entry in sequence.entries() {
        let len = entry.ticks() as u64;
        if voice.entry_start + len <= tick {
            voice.entry_start += len;
            voice.entry_index += 1;
        } else {
            break;
        }
    }
}

/// First and last note-covered tick of an instrument's track.
fn instrument_activity_span(context: &SongContext, instrument: &str) -> Option<(u64, u64)> {
    let track = context.arrangement.get(instrument)?;
    let mut first: Option<u64> = None;
    let mut last: Option<u64> = None;
    for sequence in &track.sequences {
        let mut tick = 0u64;
        for entry in sequence.entries() {
            let len = entry.ticks() as u64;
            if entry.is_note() {
                first = Some(first.map_or(tick, |f| f.min(tick)));
                last = Some(last.map_or(tick + len, |l| l.max(tick + len)));
            }
            tick += len;
        }
    }
    Some((first?, last?))
}
