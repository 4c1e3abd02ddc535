//! End-to-end playback tests against the capture backend.

use std::collections::HashMap;
use std::time::Duration;

use songhelix_engine::activity::ActivityMatrix;
use songhelix_engine::chord::Chord;
use songhelix_engine::harmony::Harmony;
use songhelix_engine::sequence::{Arrangement, Sequence, Track, TrackKind};
use songhelix_engine::song::{SongContext, Structure};
use songhelix_player::backend::{CaptureSink, MidiSink};
use songhelix_player::scheduler::{groove_tick_ns, MidiPlayer, SkipTarget};
use songhelix_spec::player::{DeviceChannelSpec, DeviceSpec, LegatoControllerSpec, MidiPlayerSpec};
use songhelix_spec::random::RandomValue;

/// A fast tempo so the 32-tick test song plays in a few milliseconds.
const FAST_MILLI_BPM: i64 = 60_000_000;

fn context_with(track: Track) -> SongContext {
    let am = Chord::from_name("Am", 12).unwrap();
    let c = Chord::from_name("C", 12).unwrap();
    let harmony = Harmony::from_timeline(&[(am, 16, true), (c, 16, true)], 32).unwrap();
    let mut arrangement = Arrangement::new();
    arrangement.add("lead", track);
    SongContext {
        structure: Structure::new(2, 4, 4, 32767),
        harmony,
        activity_matrix: ActivityMatrix::new(),
        arrangement,
        song_name: "test".to_string(),
        seed: 1,
    }
}

fn simple_track() -> Track {
    let mut sequence = Sequence::new();
    for pitch in [60, 62, 64, 65] {
        sequence.add_note(pitch, 100, 4, false);
        sequence.add_pause(4);
    }
    let mut track = Track::new(TrackKind::Melodic);
    track.sequences.push(sequence);
    track
}

fn player_spec(clock: bool, legato: Option<LegatoControllerSpec>) -> MidiPlayerSpec {
    MidiPlayerSpec {
        devices: vec![DeviceSpec {
            name: "out".to_string(),
            candidates: vec!["unused".to_string()],
            clock_synchronization: clock,
        }],
        instruments: HashMap::from([(
            "lead".to_string(),
            DeviceChannelSpec {
                device: "out".to_string(),
                channel: 0,
                program: 30,
                legato_controller: legato,
            },
        )]),
        milli_bpm: RandomValue::Fixed(FAST_MILLI_BPM),
        transposition: RandomValue::Fixed(0),
        groove: vec![1],
        lfos: Vec::new(),
        before_play_wait_ticks: 0,
        after_play_wait_ticks: 0,
        synchronization: None,
        midi_file_template: None,
        seed: None,
        salt: None,
    }
}

fn open_player(spec: &MidiPlayerSpec) -> (MidiPlayer, CaptureSink) {
    let mut player = MidiPlayer::from_spec(spec, 1).unwrap();
    let capture = CaptureSink::new();
    player
        .open_with(vec![Box::new(capture.clone()) as Box<dyn MidiSink>])
        .unwrap();
    (player, capture)
}

fn note_ons(messages: &[Vec<u8>]) -> Vec<u8> {
    messages
        .iter()
        .filter(|m| m.len() == 3 && m[0] & 0xF0 == 0x90 && m[2] > 0)
        .map(|m| m[1])
        .collect()
}

fn note_offs(messages: &[Vec<u8>]) -> Vec<u8> {
    messages
        .iter()
        .filter(|m| m.len() == 3 && (m[0] & 0xF0 == 0x80 || (m[0] & 0xF0 == 0x90 && m[2] == 0)))
        .map(|m| m[1])
        .collect()
}

#[test]
fn every_note_on_gets_a_note_off() {
    let spec = player_spec(false, None);
    let (mut player, capture) = open_player(&spec);
    let context = context_with(simple_track());
    player.play(&context).unwrap();
    player.close().unwrap();

    let messages = capture.messages();
    let ons = note_ons(&messages);
    let offs = note_offs(&messages);
    assert_eq!(ons, vec![60, 62, 64, 65]);
    for pitch in ons {
        assert!(offs.contains(&pitch), "pitch {} never released", pitch);
    }
}

#[test]
fn program_change_is_sent_at_open() {
    let spec = player_spec(false, None);
    let (mut player, capture) = open_player(&spec);
    assert_eq!(capture.messages(), vec![vec![0xC0, 30]]);
    player.close().unwrap();
}

#[test]
fn double_open_is_an_error_and_double_close_is_not() {
    let spec = player_spec(false, None);
    let (mut player, _capture) = open_player(&spec);
    assert!(player
        .open_with(vec![Box::new(CaptureSink::new()) as Box<dyn MidiSink>])
        .is_err());
    player.close().unwrap();
    player.close().unwrap();
}

#[test]
fn abort_mutes_every_used_channel() {
    let spec = player_spec(false, None);
    let (mut player, capture) = open_player(&spec);
    // A long song so the abort lands mid-playback.
    let mut sequence = Sequence::new();
    for _ in 0..1000 {
        sequence.add_note(60, 100, 2, false);
        sequence.add_pause(2);
    }
    let am = Chord::from_name("Am", 12).unwrap();
    let c = Chord::from_name("C", 12).unwrap();
    let harmony = Harmony::from_timeline(&[(am, 2000, true), (c, 2000, true)], 4000).unwrap();
    let mut track = Track::new(TrackKind::Melodic);
    track.sequences.push(sequence);
    let mut padded = Sequence::new();
    padded.add_pause(4000);
    track.sequences.push(padded);
    let mut arrangement = Arrangement::new();
    arrangement.add("lead", track);
    let context = SongContext {
        structure: Structure::new(250, 4, 4, 32767),
        harmony,
        activity_matrix: ActivityMatrix::new(),
        arrangement,
        song_name: "test".to_string(),
        seed: 1,
    };

    let shared = player.shared();
    let handle = std::thread::spawn(move || {
        player.play(&context).unwrap();
        player
    });
    std::thread::sleep(Duration::from_millis(20));
    shared.abort_play();
    let mut player = handle.join().unwrap();

    let messages = capture.messages();
    // The tail is the mute sequence: ALL SOUND OFF, ALL NOTES OFF, then a
    // NOTE_OFF for every pitch 0..=127.
    let tail = &messages[messages.len() - 130..];
    assert_eq!(tail[0], vec![0xB0, 120, 0]);
    assert_eq!(tail[1], vec![0xB0, 123, 0]);
    for (pitch, message) in tail[2..].iter().enumerate() {
        assert_eq!(message, &vec![0x80, pitch as u8, 0]);
    }
    player.close().unwrap();
}

#[test]
fn clock_sync_sends_start_pulses_and_stop() {
    let spec = player_spec(true, None);
    let (mut player, capture) = open_player(&spec);
    let context = context_with(simple_track());
    player.play(&context).unwrap();
    player.close().unwrap();

    let messages = capture.messages();
    let first_realtime = messages
        .iter()
        .find(|m| m.len() == 1)
        .expect("no realtime messages");
    assert_eq!(first_realtime, &vec![0xFA]);
    assert!(messages.contains(&vec![0xFC]));
    let clocks = messages.iter().filter(|m| *m == &vec![0xF8]).count();
    // 2 bars of 4 beats at 24 PPQN.
    assert!((150..=200).contains(&clocks), "{} clocks", clocks);
}

#[test]
fn clock_sync_rejects_indivisible_ticks_per_beat() {
    let spec = player_spec(true, None);
    let mut player = MidiPlayer::from_spec(&spec, 1).unwrap();
    player
        .open_with(vec![Box::new(CaptureSink::new()) as Box<dyn MidiSink>])
        .unwrap();
    let mut context = context_with(simple_track());
    context.structure = Structure::new(2, 4, 5, 32767);
    assert!(player.play(&context).is_err());
    player.close().unwrap();
}

#[test]
fn legato_defers_the_release_past_the_next_attack() {
    let spec = player_spec(false, None);
    let (mut player, capture) = open_player(&spec);
    let mut sequence = Sequence::new();
    sequence.add_note(60, 100, 16, true);
    sequence.add_note(62, 100, 16, false);
    let mut track = Track::new(TrackKind::Melodic);
    track.sequences.push(sequence);
    let context = context_with(track);
    player.play(&context).unwrap();
    player.close().unwrap();

    let messages = capture.messages();
    let on_62 = messages
        .iter()
        .position(|m| m == &vec![0x90, 62, 100])
        .unwrap();
    let off_60 = messages
        .iter()
        .position(|m| m == &vec![0x80, 60, 0])
        .unwrap();
    assert!(off_60 > on_62, "legato release must follow the next attack");
}

#[test]
fn legato_controller_wraps_the_tied_transition() {
    let legato = LegatoControllerSpec {
        controller: 68,
        on_value: 127,
        off_value: 0,
    };
    let spec = player_spec(false, Some(legato));
    let (mut player, capture) = open_player(&spec);
    let mut sequence = Sequence::new();
    sequence.add_note(60, 100, 16, true);
    sequence.add_note(62, 100, 16, false);
    let mut track = Track::new(TrackKind::Melodic);
    track.sequences.push(sequence);
    let context = context_with(track);
    player.play(&context).unwrap();
    player.close().unwrap();

    let messages = capture.messages();
    let position = |needle: &[u8]| messages.iter().position(|m| m == needle).unwrap();
    let cc_on = position(&[0xB0, 68, 127]);
    let on_62 = position(&[0x90, 62, 100]);
    let off_60 = position(&[0x80, 60, 0]);
    let cc_off = position(&[0xB0, 68, 0]);
    assert!(cc_on < on_62);
    assert!(on_62 < off_60);
    assert!(off_60 < cc_off);
}

#[test]
fn skip_mutes_and_jumps_forward() {
    let spec = player_spec(false, None);
    let (mut player, capture) = open_player(&spec);
    let context = context_with(simple_track());
    player.shared().request_skip(SkipTarget::Percent(50.0));
    player.play(&context).unwrap();
    player.close().unwrap();

    let messages = capture.messages();
    let ons = note_ons(&messages);
    // The first half (pitches 60 and 62) is skipped.
    assert!(!ons.contains(&60));
    assert!(!ons.contains(&62));
    assert!(ons.contains(&64));
    assert!(ons.contains(&65));
}

#[test]
fn groove_durations_are_weighted_and_period_exact() {
    // ticks_per_beat 4 at 120 BPM: a straight tick is 125 ms.
    let base = groove_tick_ns(&[1], 0, 4, 120_000);
    assert_eq!(base, 125_000_000);
    let long = groove_tick_ns(&[5, 3], 0, 4, 120_000);
    let short = groove_tick_ns(&[5, 3], 1, 4, 120_000);
    assert_eq!(long + short, 2 * base);
    assert_eq!(long * 3, short * 5);
    // Any 8-tick window sums to 8 non-grooved ticks.
    let window: u64 = (0..8).map(|k| groove_tick_ns(&[5, 3], k, 4, 120_000)).sum();
    assert_eq!(window, 8 * base);

    // Rounding lands on the period's last element.
    let odd: Vec<u64> = (0..3).map(|k| groove_tick_ns(&[1, 1, 1], k, 4, 120_000)).collect();
    assert_eq!(odd.iter().sum::<u64>(), 3 * base);
}

#[test]
fn milli_bpm_is_adjustable_mid_flight() {
    let spec = player_spec(false, None);
    let (player, _capture) = open_player(&spec);
    assert_eq!(player.milli_bpm(), FAST_MILLI_BPM as u32);
    player.set_milli_bpm(90_000);
    assert_eq!(player.milli_bpm(), 90_000);
}
