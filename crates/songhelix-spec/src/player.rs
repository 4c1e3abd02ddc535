//! Player configuration: devices, channel map, tempo, LFOs, synchronization.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::random::RandomValue;

/// Player selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerSpec {
    /// Real-time MIDI player.
    Midi(MidiPlayerSpec),
}

/// Configuration for the MIDI player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiPlayerSpec {
    /// Named output devices.
    pub devices: Vec<DeviceSpec>,
    /// Instrument name to device channel bindings.
    pub instruments: HashMap<String, DeviceChannelSpec>,
    /// Tempo in thousandths of BPM.
    #[serde(default = "default_milli_bpm")]
    pub milli_bpm: RandomValue,
    /// Global transposition applied to melodic tracks.
    #[serde(default = "default_transposition")]
    pub transposition: RandomValue,
    /// Groove weights; [1] plays straight.
    #[serde(default = "default_groove")]
    pub groove: Vec<u32>,
    /// Controller LFOs evaluated every tick.
    #[serde(default)]
    pub lfos: Vec<LfoSpec>,
    /// Ticks waited (with clock pulses) before the first musical tick.
    #[serde(default)]
    pub before_play_wait_ticks: u32,
    /// Ticks waited after the last musical tick.
    #[serde(default)]
    pub after_play_wait_ticks: u32,
    /// Optional external synchronization input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synchronization: Option<SyncSpec>,
    /// Template for per-device MIDI file export; `${name}` and `${device}`
    /// are substituted. No export when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midi_file_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<u32>,
}

/// One named MIDI output device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpec {
    /// Name used by instrument bindings and file templates.
    pub name: String,
    /// Platform port-name candidates; the first that connects wins.
    pub candidates: Vec<String>,
    /// Emit 24-PPQN clock pulses to this device.
    #[serde(default)]
    pub clock_synchronization: bool,
}

/// Binding of an instrument to a device channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceChannelSpec {
    /// Device name.
    pub device: String,
    /// MIDI channel, 0-15.
    pub channel: u8,
    /// Program number 0-127, or -1 to leave the channel program unchanged.
    #[serde(default = "default_program")]
    pub program: i16,
    /// Optional legato controller pathway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legato_controller: Option<LegatoControllerSpec>,
}

/// Legato-controller configuration for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegatoControllerSpec {
    /// Controller number.
    pub controller: u8,
    /// Value sent before a legato NOTE_ON.
    pub on_value: u8,
    /// Value sent after the deferred NOTE_OFF.
    pub off_value: u8,
}

/// A controller LFO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LfoSpec {
    /// Target controller: a name from the controller table, `cc:N`,
    /// `pitch_bend`, or the pseudo-controller `milli_bpm`.
    pub controller: String,
    /// Instrument whose channel receives the messages (also the reference
    /// for `activity` rotation). Unused for `milli_bpm`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
    /// Waveform shape.
    #[serde(default)]
    pub shape: LfoShape,
    /// Rotations per rotation unit.
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// What one rotation spans.
    #[serde(default)]
    pub rotation_unit: RotationUnit,
    /// Initial phase in rotations.
    #[serde(default)]
    pub phase: f64,
    /// Value emitted at the waveform minimum.
    pub min_value: i32,
    /// Value emitted at the waveform maximum.
    pub max_value: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<u32>,
}

/// LFO waveform shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LfoShape {
    #[default]
    Sine,
    Triangle,
    Sawtooth,
    Square,
    /// Sample-and-hold random steps.
    Random,
}

/// What one LFO rotation spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationUnit {
    /// The whole song.
    #[default]
    Song,
    /// The instrument's first-active to last-active span.
    Activity,
    /// One beat.
    Beat,
    /// One wall-clock second.
    Second,
}

/// External synchronization input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSpec {
    /// Input port-name candidates.
    pub candidates: Vec<String>,
    /// Hold playback until a START message arrives.
    #[serde(default)]
    pub wait_for_start: bool,
}

fn default_milli_bpm() -> RandomValue {
    RandomValue::Fixed(120_000)
}

fn default_transposition() -> RandomValue {
    RandomValue::Fixed(0)
}

fn default_groove() -> Vec<u32> {
    vec![1]
}

fn default_program() -> i16 {
    -1
}

fn default_speed() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_player_deserializes() {
        let json = r#"{
            "type": "midi",
            "devices": [{"name": "out", "candidates": ["FLUID"]}],
            "instruments": {"lead": {"device": "out", "channel": 0}}
        }"#;
        let spec: PlayerSpec = serde_json::from_str(json).unwrap();
        let PlayerSpec::Midi(midi) = spec;
        assert_eq!(midi.groove, vec![1]);
        assert_eq!(midi.instruments["lead"].program, -1);
        assert_eq!(midi.milli_bpm, RandomValue::Fixed(120_000));
    }

    #[test]
    fn lfo_defaults() {
        let json = r#"{"controller":"cc:74","min_value":0,"max_value":127}"#;
        let lfo: LfoSpec = serde_json::from_str(json).unwrap();
        assert_eq!(lfo.shape, LfoShape::Sine);
        assert_eq!(lfo.rotation_unit, RotationUnit::Song);
        assert_eq!(lfo.speed, 1.0);
    }
}
