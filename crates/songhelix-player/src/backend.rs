//! The device boundary: one small trait, a midir backend, a capture backend.

use std::sync::{Arc, Mutex};

use midir::{MidiOutput, MidiOutputConnection};

use crate::error::PlayerError;

/// A sink for raw MIDI bytes. One per device.
pub trait MidiSink: Send {
    fn send(&mut self, message: &[u8]) -> Result<(), PlayerError>;
}

/// Real MIDI output through midir.
pub struct MidirSink {
    device: String,
    connection: MidiOutputConnection,
}

impl MidirSink {
    /// Connect to the first port whose name contains one of the candidates.
    pub fn connect(device: &str, candidates: &[String]) -> Result<Self, PlayerError> {
        let output = MidiOutput::new("songhelix").map_err(|e| PlayerError::Config {
            message: format!("could not create MIDI output: {}", e),
        })?;
        let ports = output.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|p| output.port_name(p).unwrap_or_default())
            .collect();
        for candidate in candidates {
            if let Some(index) = names.iter().position(|name| name.contains(candidate)) {
                let connection = output
                    .connect(&ports[index], "songhelix-out")
                    .map_err(|e| PlayerError::Config {
                        message: format!("could not connect to '{}': {}", names[index], e),
                    })?;
                log::info!("device '{}' connected to port '{}'", device, names[index]);
                return Ok(MidirSink {
                    device: device.to_string(),
                    connection,
                });
            }
        }
        Err(PlayerError::DeviceUnavailable {
            device: device.to_string(),
            candidates: candidates.to_vec(),
            available: names,
        })
    }

    /// Names of all currently available output ports.
    pub fn available_ports() -> Result<Vec<String>, PlayerError> {
        let output = MidiOutput::new("songhelix").map_err(|e| PlayerError::Config {
            message: format!("could not create MIDI output: {}", e),
        })?;
        Ok(output
            .ports()
            .iter()
            .map(|p| output.port_name(p).unwrap_or_default())
            .collect())
    }
}

impl MidiSink for MidirSink {
    fn send(&mut self, message: &[u8]) -> Result<(), PlayerError> {
        self.connection
            .send(message)
            .map_err(|e| PlayerError::Send {
                device: self.device.clone(),
                message: e.to_string(),
            })
    }
}

/// In-memory sink recording every message, for tests and dry runs.
#[derive(Clone, Default)]
pub struct CaptureSink {
    messages: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        CaptureSink::default()
    }

    /// Everything sent so far.
    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.messages.lock().unwrap().clone()
    }
}

impl MidiSink for CaptureSink {
    fn send(&mut self, message: &[u8]) -> Result<(), PlayerError> {
        self.messages.lock().unwrap().push(message.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_sink_records_in_order() {
        let sink = CaptureSink::new();
        let mut writer = sink.clone();
        writer.send(&[0x90, 60, 100]).unwrap();
        writer.send(&[0x80, 60, 0]).unwrap();
        assert_eq!(sink.messages(), vec![vec![0x90, 60, 100], vec![0x80, 60, 0]]);
    }
}
