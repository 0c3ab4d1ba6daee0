use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::analog::AxisKind;
use super::buttons::LogicalButton;

// Host-facing controller event
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    ButtonPressed {
        button: LogicalButton,
        slot: usize,
        is_repeat: bool,
    },
    ButtonReleased {
        button: LogicalButton,
        slot: usize,
    },
    AnalogChanged {
        axis: AxisKind,
        slot: usize,
        value: f32,
    },
    ConnectionChanged {
        connected: bool,
        slot: usize,
    },
}

impl ControllerEvent {
    pub fn slot(&self) -> usize {
        match self {
            ControllerEvent::ButtonPressed { slot, .. }
            | ControllerEvent::ButtonReleased { slot, .. }
            | ControllerEvent::AnalogChanged { slot, .. }
            | ControllerEvent::ConnectionChanged { slot, .. } => *slot,
        }
    }

    /// Analog changes and repeat presses are superseded by the next tick,
    /// so losing one leaves the host state consistent. Edges are not.
    pub fn is_lossy(&self) -> bool {
        matches!(
            self,
            ControllerEvent::AnalogChanged { .. }
                | ControllerEvent::ButtonPressed {
                    is_repeat: true,
                    ..
                }
        )
    }

    /// Hand the event to `sink`.
    pub fn dispatch(&self, sink: &mut dyn EventSink) {
        match *self {
            ControllerEvent::ButtonPressed {
                button,
                slot,
                is_repeat,
            } => sink.on_button_pressed(button, slot, is_repeat),
            ControllerEvent::ButtonReleased { button, slot } => {
                sink.on_button_released(button, slot)
            }
            ControllerEvent::AnalogChanged { axis, slot, value } => {
                sink.on_analog_changed(axis, slot, value)
            }
            ControllerEvent::ConnectionChanged { connected, slot } => {
                sink.on_connection_changed(connected, slot)
            }
        }
    }
}

/// Receiver of emitted events. Called synchronously from inside a tick.
pub trait EventSink: Send {
    fn on_button_pressed(&mut self, button: LogicalButton, slot: usize, is_repeat: bool);
    fn on_button_released(&mut self, button: LogicalButton, slot: usize);
    fn on_analog_changed(&mut self, axis: AxisKind, slot: usize, value: f32);
    fn on_connection_changed(&mut self, connected: bool, slot: usize);
}

// Timestamped event as forwarded over a channel
#[derive(Debug, Clone, PartialEq)]
pub struct StampedEvent {
    pub event: ControllerEvent,
    pub timestamp: DateTime<Local>,
}

/// Forwards events into a tokio channel. Full or closed channels drop the
/// event and log; the tick never waits on the consumer.
///
/// The last `reserve` free slots of the channel are kept for edge events:
/// once free capacity drops to the reserve, lossy events (see
/// [`ControllerEvent::is_lossy`]) are dropped so that presses, releases and
/// connection changes still get through to a slow consumer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<StampedEvent>,
    reserve: usize,
    dropped: u64,
}

impl ChannelSink {
    /// Reserve a quarter of the channel for edge events.
    pub fn new(sender: mpsc::Sender<StampedEvent>) -> Self {
        let reserve = sender.max_capacity() / 4;
        Self::with_reserve(sender, reserve)
    }

    pub fn with_reserve(sender: mpsc::Sender<StampedEvent>, reserve: usize) -> Self {
        Self {
            sender,
            reserve,
            dropped: 0,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn forward(&mut self, event: ControllerEvent) {
        if event.is_lossy() && self.sender.capacity() <= self.reserve {
            self.dropped += 1;
            debug!("Host queue low, dropping {:?}", event);
            return;
        }
        let stamped = StampedEvent {
            event,
            timestamp: Local::now(),
        };
        match self.sender.try_send(stamped) {
            Ok(_) => debug!("Event forwarded to host queue"),
            Err(mpsc::error::TrySendError::Full(stamped)) => {
                self.dropped += 1;
                warn!("Host queue full, dropping {:?}", stamped.event);
            }
            Err(mpsc::error::TrySendError::Closed(stamped)) => {
                self.dropped += 1;
                error!("Host queue closed, dropping {:?}", stamped.event);
            }
        }
    }
}

impl EventSink for ChannelSink {
    fn on_button_pressed(&mut self, button: LogicalButton, slot: usize, is_repeat: bool) {
        self.forward(ControllerEvent::ButtonPressed {
            button,
            slot,
            is_repeat,
        });
    }

    fn on_button_released(&mut self, button: LogicalButton, slot: usize) {
        self.forward(ControllerEvent::ButtonReleased { button, slot });
    }

    fn on_analog_changed(&mut self, axis: AxisKind, slot: usize, value: f32) {
        self.forward(ControllerEvent::AnalogChanged { axis, slot, value });
    }

    fn on_connection_changed(&mut self, connected: bool, slot: usize) {
        self.forward(ControllerEvent::ConnectionChanged { connected, slot });
    }
}

/// Discards everything. Used until the host installs a handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_button_pressed(&mut self, _button: LogicalButton, _slot: usize, _is_repeat: bool) {}
    fn on_button_released(&mut self, _button: LogicalButton, _slot: usize) {}
    fn on_analog_changed(&mut self, _axis: AxisKind, _slot: usize, _value: f32) {}
    fn on_connection_changed(&mut self, _connected: bool, _slot: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_forwards_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut sink = ChannelSink::new(tx);

        let events = [
            ControllerEvent::ConnectionChanged {
                connected: true,
                slot: 2,
            },
            ControllerEvent::ButtonPressed {
                button: LogicalButton::DPadUp,
                slot: 2,
                is_repeat: false,
            },
            ControllerEvent::AnalogChanged {
                axis: AxisKind::LeftX,
                slot: 2,
                value: 0.5,
            },
        ];
        for event in &events {
            event.dispatch(&mut sink);
        }

        for expected in events {
            let got = rx.recv().await.expect("event forwarded");
            assert_eq!(got.event, expected);
        }
    }

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let mut sink = ChannelSink::new(tx);

        sink.on_button_released(LogicalButton::FaceButtonTop, 0);
        sink.on_button_released(LogicalButton::FaceButtonTop, 0);
        assert_eq!(sink.dropped(), 1);
    }

    #[tokio::test]
    async fn edges_get_through_when_the_queue_is_low() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut sink = ChannelSink::with_reserve(tx, 2);

        sink.on_analog_changed(AxisKind::LeftX, 0, 0.1);
        sink.on_analog_changed(AxisKind::LeftX, 0, 0.2);
        // only the reserve is left now
        sink.on_analog_changed(AxisKind::LeftX, 0, 0.3);
        sink.on_button_pressed(LogicalButton::DPadUp, 0, true);
        sink.on_button_released(LogicalButton::DPadUp, 0);
        sink.on_connection_changed(false, 0);
        assert_eq!(sink.dropped(), 2);

        let mut received = Vec::new();
        while let Ok(stamped) = rx.try_recv() {
            received.push(stamped.event);
        }
        assert_eq!(
            received,
            vec![
                ControllerEvent::AnalogChanged {
                    axis: AxisKind::LeftX,
                    slot: 0,
                    value: 0.1
                },
                ControllerEvent::AnalogChanged {
                    axis: AxisKind::LeftX,
                    slot: 0,
                    value: 0.2
                },
                ControllerEvent::ButtonReleased {
                    button: LogicalButton::DPadUp,
                    slot: 0
                },
                ControllerEvent::ConnectionChanged {
                    connected: false,
                    slot: 0
                },
            ]
        );
    }

    #[test]
    fn default_reserve_is_a_quarter_of_the_channel() {
        let (tx, _rx) = mpsc::channel(1000);
        let mut sink = ChannelSink::new(tx);
        for _ in 0..750 {
            sink.on_analog_changed(AxisKind::RightY, 1, -0.5);
        }
        assert_eq!(sink.dropped(), 0);

        sink.on_analog_changed(AxisKind::RightY, 1, -0.5);
        sink.on_button_pressed(LogicalButton::FaceButtonLeft, 1, false);
        assert_eq!(sink.dropped(), 1);
    }

    #[test]
    fn slot_is_read_from_any_variant() {
        let event = ControllerEvent::ButtonReleased {
            button: LogicalButton::LeftShoulder,
            slot: 3,
        };
        assert_eq!(event.slot(), 3);
    }
}
