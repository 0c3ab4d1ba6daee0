//! Engine aggregate: owns every slot, the transport and the event sink, and
//! runs one full evaluation of all slots per tick.
//!
//! # Tick order (per slot)
//!
//! 1. fetch the raw sample; a failed fetch means "not connected this tick"
//! 2. connection edge: report it, release everything on disconnect, start
//!    from a neutral cache on connect
//! 3. button/axis diff
//! 4. motion fusion and gyro camera events
//! 5. compose and write the output packet
//!
//! Slots never affect each other. A failed read or write on one slot is
//! logged and the tick moves on.

use chrono::{DateTime, Local};
use tracing::{debug, error, info, warn};

use super::connection::{ConnectionChange, ConnectionTracker};
use super::diff_engine::{DiffEngine, SlotInputState};
use super::error::EngineError;
use super::events::{ControllerEvent, EventSink};
use super::output::{
    compose, ForceFeedbackChannel, ForceFeedbackValues, LightBarState, OutputState,
    PlayerLedState,
};
use crate::config::EngineConfig;
use crate::motion::MotionState;
use crate::transport::Transport;

pub const MAX_CONTROLLERS: usize = 4;

/// Everything the engine keeps for one physical controller.
#[derive(Debug, Clone)]
pub struct ControllerSlot {
    index: usize,
    connection: ConnectionTracker,
    input: SlotInputState,
    output: OutputState,
    motion: MotionState,
}

impl ControllerSlot {
    fn new(index: usize, config: &EngineConfig) -> Self {
        Self {
            index,
            connection: ConnectionTracker::new(index),
            input: SlotInputState::new(&config.input),
            output: OutputState::default(),
            motion: MotionState::new(&config.motion),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection(&self) -> &ConnectionTracker {
        &self.connection
    }

    pub fn input(&self) -> &SlotInputState {
        &self.input
    }

    pub fn output(&self) -> &OutputState {
        &self.output
    }

    pub fn motion(&self) -> &MotionState {
        &self.motion
    }
}

fn emit(sink: &mut dyn EventSink, events: &[ControllerEvent]) {
    for event in events {
        event.dispatch(sink);
    }
}

pub struct DualSenseInterface {
    config: EngineConfig,
    diff: DiffEngine,
    slots: [ControllerSlot; MAX_CONTROLLERS],
    transport: Box<dyn Transport>,
    sink: Box<dyn EventSink>,
    enumeration_failure: Option<String>,
    // Recomputed every tick from slot liveness
    any_connected: bool,
    refresh_requested: bool,
}

impl DualSenseInterface {
    /// Build the engine and enumerate devices once. Without a device the
    /// engine is inert: polling does nothing and control calls fail.
    pub fn new(
        config: EngineConfig,
        mut transport: Box<dyn Transport>,
        sink: Box<dyn EventSink>,
    ) -> Self {
        let enumeration_failure = match transport.enumerate() {
            Ok(0) => Some("no devices found".to_string()),
            Ok(count) => {
                info!("Found {} devices, polling {} slots", count, MAX_CONTROLLERS);
                None
            }
            Err(e) => Some(e.to_string()),
        };
        if let Some(reason) = &enumeration_failure {
            error!("Controller engine is inert: {}", reason);
        }

        let slots = std::array::from_fn(|index| ControllerSlot::new(index, &config));

        Self {
            diff: DiffEngine::new(&config.input),
            config,
            slots,
            transport,
            sink,
            any_connected: enumeration_failure.is_none(),
            enumeration_failure,
            refresh_requested: false,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// True when enumeration found a device and, once ticking, at least one
    /// slot produced a sample on the last tick.
    pub fn is_any_device_attached(&self) -> bool {
        self.enumeration_failure.is_none() && self.any_connected
    }

    pub fn set_event_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sink = sink;
    }

    pub fn slot(&self, slot: usize) -> Option<&ControllerSlot> {
        self.slots.get(slot)
    }

    pub fn motion(&self, slot: usize) -> Option<&MotionState> {
        self.slots.get(slot).map(ControllerSlot::motion)
    }

    pub fn poll(&mut self) {
        self.poll_at(Local::now());
    }

    /// One tick over every slot, timestamped `now`.
    pub fn poll_at(&mut self, now: DateTime<Local>) {
        if self.enumeration_failure.is_some() {
            return;
        }
        let refresh = std::mem::take(&mut self.refresh_requested);
        if refresh {
            debug!("Refreshing controller state on all slots");
        }

        let mut any_connected = false;
        for slot in self.slots.iter_mut() {
            let index = slot.index;
            let sample = match self.transport.fetch_raw_sample(index) {
                Ok(sample) => Some(sample),
                Err(source) => {
                    let err = EngineError::TransportReadFailure {
                        slot: index,
                        source,
                    };
                    if slot.connection.ever_connected() {
                        debug!("{}", err);
                    }
                    None
                }
            };

            match slot.connection.update(sample.is_some()) {
                ConnectionChange::JustConnected => {
                    self.sink.on_connection_changed(true, index);
                    slot.input.reset_to_neutral();
                }
                ConnectionChange::JustDisconnected => {
                    let released = self.diff.release_all(index, &mut slot.input);
                    emit(self.sink.as_mut(), &released);
                    self.sink.on_connection_changed(false, index);
                    slot.output.reset();
                    slot.motion.reset();
                }
                ConnectionChange::Unchanged => {
                    if refresh {
                        slot.input.reset_to_neutral();
                    }
                }
            }

            let Some(sample) = sample else {
                continue;
            };
            any_connected = true;

            let events = self.diff.evaluate(index, &mut slot.input, &sample, now);
            emit(self.sink.as_mut(), &events);

            if !slot.motion.is_tracking() {
                slot.motion.init(index);
            }
            if let Some(delta) = slot.motion.update(sample.gyro_dps(), sample.accel_g(), now) {
                let gyro_events = self.diff.evaluate_gyro(index, &mut slot.input, &delta);
                emit(self.sink.as_mut(), &gyro_events);
            }

            let packet = compose(&slot.output, &self.config.output);
            if let Err(e) = self.transport.write_output(index, &packet) {
                warn!("Failed to write output to slot {}: {}", index, e);
            }
        }

        if any_connected != self.any_connected {
            info!("Any device attached: {}", any_connected);
        }
        self.any_connected = any_connected;
    }

    fn checked_slot(&mut self, slot: usize) -> Result<&mut ControllerSlot, EngineError> {
        if let Some(reason) = &self.enumeration_failure {
            return Err(EngineError::EnumerationFailure(reason.clone()));
        }
        self.slots
            .get_mut(slot)
            .ok_or(EngineError::SlotOutOfRange(slot))
    }

    fn connected_slot(&mut self, slot: usize) -> Result<&mut ControllerSlot, EngineError> {
        let controller = self.checked_slot(slot)?;
        if controller.is_connected() {
            Ok(controller)
        } else {
            Err(EngineError::SlotNotConnected(slot))
        }
    }

    pub fn set_force_feedback_channel(
        &mut self,
        slot: usize,
        channel: ForceFeedbackChannel,
        value: f32,
    ) -> Result<(), EngineError> {
        let controller = self.connected_slot(slot)?;
        controller.output.force_feedback.set(channel, value);
        Ok(())
    }

    pub fn set_force_feedback_all(
        &mut self,
        slot: usize,
        values: ForceFeedbackValues,
    ) -> Result<(), EngineError> {
        let controller = self.connected_slot(slot)?;
        controller.output.force_feedback = values.clamped();
        Ok(())
    }

    pub fn set_led(&mut self, slot: usize, leds: PlayerLedState) -> Result<(), EngineError> {
        let controller = self.checked_slot(slot)?;
        debug!("Slot {} player LEDs: {:?}", slot, leds);
        controller.output.player_leds = leds;
        Ok(())
    }

    pub fn set_light_bar(&mut self, slot: usize, light_bar: LightBarState) -> Result<(), EngineError> {
        let controller = self.checked_slot(slot)?;
        debug!("Slot {} light bar: {:?}", slot, light_bar);
        controller.output.light_bar = light_bar.clamped();
        Ok(())
    }

    pub fn reset_continuous_calibration(&mut self, slot: usize) -> Result<(), EngineError> {
        let controller = self.checked_slot(slot)?;
        info!("Resetting gyro calibration on slot {}", slot);
        controller.motion.reset_continuous_calibration();
        Ok(())
    }

    /// Re-report the full state of every connected slot on the next tick.
    pub fn request_state_refresh(&mut self) -> Result<(), EngineError> {
        if let Some(reason) = &self.enumeration_failure {
            return Err(EngineError::EnumerationFailure(reason.clone()));
        }
        self.refresh_requested = true;
        Ok(())
    }
}

/// Host-facing device object. Errors from the control calls are logged and
/// swallowed; the host never sees them.
pub trait InputDevice: Send {
    fn poll(&mut self);
    fn set_message_handler(&mut self, sink: Box<dyn EventSink>);
    fn set_force_feedback_channel(&mut self, slot: usize, channel: ForceFeedbackChannel, value: f32);
    fn set_force_feedback_channels(&mut self, slot: usize, values: ForceFeedbackValues);
    fn is_attached(&self) -> bool;
}

impl InputDevice for DualSenseInterface {
    fn poll(&mut self) {
        DualSenseInterface::poll(self);
    }

    fn set_message_handler(&mut self, sink: Box<dyn EventSink>) {
        info!("Installing new message handler");
        self.set_event_sink(sink);
    }

    fn set_force_feedback_channel(&mut self, slot: usize, channel: ForceFeedbackChannel, value: f32) {
        if let Err(e) = DualSenseInterface::set_force_feedback_channel(self, slot, channel, value) {
            debug!("Ignoring force feedback on {:?}: {}", channel, e);
        }
    }

    fn set_force_feedback_channels(&mut self, slot: usize, values: ForceFeedbackValues) {
        if let Err(e) = self.set_force_feedback_all(slot, values) {
            debug!("Ignoring force feedback values: {}", e);
        }
    }

    fn is_attached(&self) -> bool {
        self.is_any_device_attached()
    }
}
