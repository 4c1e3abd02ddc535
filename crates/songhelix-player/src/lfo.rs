//! Controller LFOs: tick-indexed low-frequency oscillators driving MIDI
//! controllers, pitch bend, or the tempo.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use songhelix_spec::player::{LfoShape, LfoSpec, RotationUnit};

use crate::error::PlayerError;

/// What an LFO writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerTarget {
    /// 14-bit pitch bend.
    PitchBend,
    /// The scheduler's tempo, in thousandths of BPM.
    MilliBpm,
    /// A 7-bit control change.
    Controller(u8),
}

/// Parse a controller name: a known name, `cc:N`, `pitch_bend`, `milli_bpm`.
pub fn parse_controller(name: &str) -> Result<ControllerTarget, PlayerError> {
    if let Some(number) = name.strip_prefix("cc:") {
        let cc: u8 = number.parse().map_err(|_| PlayerError::Config {
            message: format!("invalid controller number '{}'", name),
        })?;
        if cc > 127 {
            return Err(PlayerError::Config {
                message: format!("controller number {} out of range", cc),
            });
        }
        return Ok(ControllerTarget::Controller(cc));
    }
    let target = match name {
        "pitch_bend" => ControllerTarget::PitchBend,
        "milli_bpm" => ControllerTarget::MilliBpm,
        "modulation_wheel" => ControllerTarget::Controller(1),
        "breath" => ControllerTarget::Controller(2),
        "foot_pedal" => ControllerTarget::Controller(4),
        "volume" => ControllerTarget::Controller(7),
        "balance" => ControllerTarget::Controller(8),
        "pan" => ControllerTarget::Controller(10),
        "expression" => ControllerTarget::Controller(11),
        "effect1" => ControllerTarget::Controller(12),
        "effect2" => ControllerTarget::Controller(13),
        "variation" => ControllerTarget::Controller(70),
        "timbre" => ControllerTarget::Controller(71),
        "release_time" => ControllerTarget::Controller(72),
        "attack_time" => ControllerTarget::Controller(73),
        "brightness" => ControllerTarget::Controller(74),
        _ => {
            return Err(PlayerError::Config {
                message: format!("unknown controller '{}'", name),
            })
        }
    };
    Ok(target)
}

/// One configured LFO plus its playback state.
pub struct ControllerLfo {
    pub target: ControllerTarget,
    pub instrument: Option<String>,
    pub rotation_unit: RotationUnit,
    pub speed: f64,
    shape: LfoShape,
    phase: f64,
    min_value: i32,
    max_value: i32,
    seed: u64,
    /// Value sent at the previous evaluation, if any.
    pub last_sent: Option<i32>,
}

impl ControllerLfo {
    /// Build from configuration.
    pub fn from_spec(spec: &LfoSpec, seed: u64) -> Result<Self, PlayerError> {
        if spec.min_value > spec.max_value {
            return Err(PlayerError::Config {
                message: format!(
                    "LFO min_value {} exceeds max_value {}",
                    spec.min_value, spec.max_value
                ),
            });
        }
        Ok(ControllerLfo {
            target: parse_controller(&spec.controller)?,
            instrument: spec.instrument.clone(),
            rotation_unit: spec.rotation_unit,
            speed: spec.speed,
            shape: spec.shape,
            phase: spec.phase,
            min_value: spec.min_value,
            max_value: spec.max_value,
            seed,
            last_sent: None,
        })
    }

    /// The integer value at a phase (in rotations).
    pub fn value_at(&self, phase: f64) -> i32 {
        let phase = phase + self.phase;
        let frac = phase.rem_euclid(1.0);
        let wave = match self.shape {
            LfoShape::Sine => ((std::f64::consts::TAU * frac).sin() + 1.0) / 2.0,
            LfoShape::Triangle => {
                if frac < 0.5 {
                    2.0 * frac
                } else {
                    2.0 - 2.0 * frac
                }
            }
            LfoShape::Sawtooth => frac,
            LfoShape::Square => {
                if frac < 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            LfoShape::Random => {
                // Sample-and-hold: one draw per rotation, stable per seed.
                let rotation = phase.floor() as i64 as u64;
                Pcg32::seed_from_u64(self.seed ^ rotation.wrapping_mul(0x9E3779B97F4A7C15))
                    .gen::<f64>()
            }
        };
        let span = (self.max_value - self.min_value) as f64;
        self.min_value + (wave * span).round() as i32
    }
}
