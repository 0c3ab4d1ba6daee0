//! Controller subsystem: from raw device samples to host events and back
//!
//! Every tick, per slot:
//!
//! 1. [`connection`] - liveness edges from fetch success
//! 2. [`diff_engine`] - button and axis transitions with key repeat
//!    (rules in [`buttons`], axis caches in [`analog`])
//! 3. [`output`] - rumble, LED and lightbar packet for the device
//!
//! ```text
//! Transport ──► RawControllerSample ──► DiffEngine ──► EventSink
//!                        │
//!                        └──► MotionState (motion::)
//! OutputState ──► compose ──► Transport
//! ```
//!
//! [`interface::DualSenseInterface`] ties the stages together for all slots
//! and [`poller`] drives it from a tokio task.

pub mod analog;
pub mod buttons;
pub mod connection;
pub mod diff_engine;
pub mod error;
pub mod events;
pub mod interface;
pub mod output;
pub mod poller;
pub mod sample;

pub use analog::AxisKind;
pub use buttons::LogicalButton;
pub use error::EngineError;
pub use events::{ChannelSink, ControllerEvent, EventSink, NullSink, StampedEvent};
pub use interface::{DualSenseInterface, InputDevice, MAX_CONTROLLERS};
pub use output::{
    ForceFeedbackChannel, ForceFeedbackValues, LedBrightness, LedPosition, LightBarState,
    OutputPacket, PlayerLedState,
};
pub use poller::{HostCommand, PollerHandle};
pub use sample::RawControllerSample;
