//! Capture playback transport.
//!
//! A capture is a TOML document listing, per slot, the frames the device
//! produced one tick at a time:
//!
//! ```toml
//! looped = false
//!
//! [[slots]]
//! slot = 0
//!
//! [[slots.frames]]
//! [slots.frames.sample]
//! left_trigger = 40
//!
//! [[slots.frames]]
//! connected = false
//! ```
//!
//! Fields left out of a sample are neutral. A frame with `connected = false`
//! reads as a failed fetch, as does running past the last frame of a slot
//! that is not looped.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::{Transport, TransportError};
use crate::controller::output::OutputPacket;
use crate::controller::sample::RawControllerSample;

fn connected_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayFrame {
    #[serde(default = "connected_by_default")]
    pub connected: bool,
    #[serde(default)]
    pub sample: RawControllerSample,
}

impl ReplayFrame {
    pub fn connected(sample: RawControllerSample) -> Self {
        Self {
            connected: true,
            sample,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            connected: false,
            sample: RawControllerSample::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplaySlot {
    pub slot: usize,
    #[serde(default)]
    pub frames: Vec<ReplayFrame>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayCapture {
    #[serde(default)]
    pub looped: bool,
    #[serde(default)]
    pub slots: Vec<ReplaySlot>,
}

/// Last packet written to each slot, shared with whoever wants to inspect it
/// after the transport was handed to the engine.
#[derive(Debug, Clone, Default)]
pub struct OutputLog(Arc<Mutex<HashMap<usize, OutputPacket>>>);

impl OutputLog {
    pub fn last(&self, slot: usize) -> Option<OutputPacket> {
        match self.0.lock() {
            Ok(packets) => packets.get(&slot).copied(),
            Err(e) => {
                warn!("Output log poisoned: {}", e);
                None
            }
        }
    }

    fn record(&self, slot: usize, packet: OutputPacket) {
        if let Ok(mut packets) = self.0.lock() {
            packets.insert(slot, packet);
        }
    }
}

#[derive(Debug)]
pub struct ReplayTransport {
    capture: ReplayCapture,
    cursors: HashMap<usize, usize>,
    output_log: OutputLog,
}

impl ReplayTransport {
    pub fn new(capture: ReplayCapture) -> Self {
        info!(
            "Replay transport with {} slots (looped: {})",
            capture.slots.len(),
            capture.looped
        );
        Self {
            capture,
            cursors: HashMap::new(),
            output_log: OutputLog::default(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, TransportError> {
        let capture: ReplayCapture =
            toml::from_str(content).map_err(|e| TransportError::Replay(e.to_string()))?;
        Ok(Self::new(capture))
    }

    pub fn load(path: &Path) -> Result<Self, TransportError> {
        debug!("Loading replay capture from {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|e| {
            TransportError::Replay(format!("Failed to read capture {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn output_log(&self) -> OutputLog {
        self.output_log.clone()
    }

    /// True once every non-looped slot has played its last frame.
    pub fn is_exhausted(&self) -> bool {
        !self.capture.looped
            && self.capture.slots.iter().all(|slot| {
                self.cursors.get(&slot.slot).copied().unwrap_or(0) >= slot.frames.len()
            })
    }

    fn slot_frames(&self, slot: usize) -> Option<&[ReplayFrame]> {
        self.capture
            .slots
            .iter()
            .find(|s| s.slot == slot)
            .map(|s| s.frames.as_slice())
    }
}

impl Transport for ReplayTransport {
    fn enumerate(&mut self) -> Result<usize, TransportError> {
        let count = self
            .capture
            .slots
            .iter()
            .filter(|s| !s.frames.is_empty())
            .count();
        info!("Replay capture provides {} devices", count);
        Ok(count)
    }

    fn fetch_raw_sample(&mut self, slot: usize) -> Result<RawControllerSample, TransportError> {
        let looped = self.capture.looped;
        let frames = self.slot_frames(slot).ok_or_else(|| TransportError::Read {
            slot,
            reason: "no device in capture".to_string(),
        })?;
        let len = frames.len();

        let cursor = self.cursors.get(&slot).copied().unwrap_or(0);
        let index = match (cursor < len, looped && len > 0) {
            (true, _) => cursor,
            (false, true) => 0,
            (false, false) => {
                return Err(TransportError::Read {
                    slot,
                    reason: "capture exhausted".to_string(),
                })
            }
        };
        let frame = frames[index].clone();
        self.cursors.insert(slot, index + 1);

        trace!("Replaying frame {} of slot {}", index, slot);
        if frame.connected {
            Ok(frame.sample)
        } else {
            Err(TransportError::Read {
                slot,
                reason: "device disconnected".to_string(),
            })
        }
    }

    fn write_output(&mut self, slot: usize, packet: &OutputPacket) -> Result<(), TransportError> {
        if self.slot_frames(slot).is_none() {
            return Err(TransportError::Write {
                slot,
                reason: "no device in capture".to_string(),
            });
        }
        self.output_log.record(slot, *packet);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPTURE: &str = r#"
        [[slots]]
        slot = 1

        [[slots.frames]]
        [slots.frames.sample]
        left_trigger = 40

        [[slots.frames]]
        connected = false

        [[slots.frames]]
        [slots.frames.sample.left_stick]
        x = -20
    "#;

    #[test]
    fn frames_play_in_order_then_run_out() {
        let mut transport = ReplayTransport::from_toml_str(CAPTURE).unwrap();
        assert_eq!(transport.enumerate().unwrap(), 1);

        assert_eq!(transport.fetch_raw_sample(1).unwrap().left_trigger, 40);
        assert!(matches!(
            transport.fetch_raw_sample(1),
            Err(TransportError::Read { slot: 1, .. })
        ));
        assert_eq!(transport.fetch_raw_sample(1).unwrap().left_stick.x, -20);
        assert!(transport.is_exhausted());
        assert!(transport.fetch_raw_sample(1).is_err());
    }

    #[test]
    fn unknown_slot_fails_to_read_and_write() {
        let mut transport = ReplayTransport::from_toml_str(CAPTURE).unwrap();
        assert!(transport.fetch_raw_sample(0).is_err());
        assert!(transport
            .write_output(0, &OutputPacket::default())
            .is_err());
    }

    #[test]
    fn looped_capture_wraps_around() {
        let capture = ReplayCapture {
            looped: true,
            slots: vec![ReplaySlot {
                slot: 0,
                frames: vec![
                    ReplayFrame::connected(RawControllerSample {
                        right_trigger: 1,
                        ..Default::default()
                    }),
                    ReplayFrame::connected(RawControllerSample {
                        right_trigger: 2,
                        ..Default::default()
                    }),
                ],
            }],
        };
        let mut transport = ReplayTransport::new(capture);
        let seen: Vec<u8> = (0..5)
            .map(|_| transport.fetch_raw_sample(0).unwrap().right_trigger)
            .collect();
        assert_eq!(seen, vec![1, 2, 1, 2, 1]);
        assert!(!transport.is_exhausted());
    }

    #[test]
    fn written_packets_are_visible_through_the_log() {
        let mut transport = ReplayTransport::from_toml_str(CAPTURE).unwrap();
        let log = transport.output_log();
        let packet = OutputPacket {
            left_rumble: 9,
            ..Default::default()
        };
        transport.write_output(1, &packet).unwrap();
        assert_eq!(log.last(1), Some(packet));
        assert_eq!(log.last(0), None);
    }

    #[test]
    fn malformed_capture_is_a_replay_error() {
        let err = ReplayTransport::from_toml_str("slots = 3").unwrap_err();
        assert!(matches!(err, TransportError::Replay(_)));
    }
}
