//! Raw device transport
//!
//! The engine never talks to hardware directly. A [`Transport`] hands it one
//! [`RawControllerSample`] per slot per tick and accepts the composed
//! [`OutputPacket`] in return. [`replay::ReplayTransport`] plays back a
//! recorded capture and is what the binary and the tests run against.

pub mod replay;

use crate::controller::output::OutputPacket;
use crate::controller::sample::RawControllerSample;

pub use replay::{OutputLog, ReplayCapture, ReplayFrame, ReplaySlot, ReplayTransport};

// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Enumeration failed: {0}")]
    Enumeration(String),

    #[error("Read from slot {slot} failed: {reason}")]
    Read { slot: usize, reason: String },

    #[error("Write to slot {slot} failed: {reason}")]
    Write { slot: usize, reason: String },

    #[error("Replay capture error: {0}")]
    Replay(String),
}

pub trait Transport: Send {
    /// Number of devices available. Called once when the engine is built.
    fn enumerate(&mut self) -> Result<usize, TransportError>;

    /// This tick's sample for `slot`. An error means the slot is not
    /// connected right now.
    fn fetch_raw_sample(&mut self, slot: usize) -> Result<RawControllerSample, TransportError>;

    fn write_output(&mut self, slot: usize, packet: &OutputPacket) -> Result<(), TransportError>;
}
