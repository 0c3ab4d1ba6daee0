//! Tick driver for the engine.
//!
//! The engine itself never spawns or blocks. `PadPoller` owns it inside a
//! tokio task and calls `poll` on a fixed interval. Host control calls made
//! while the poller owns the engine travel as [`HostCommand`]s over an mpsc
//! queue and are drained before every tick, so a tick always sees one
//! consistent set of output values.

use std::time::Duration;

use statum::{machine, state};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::EngineError;
use super::interface::DualSenseInterface;
use super::output::{ForceFeedbackChannel, ForceFeedbackValues, LightBarState, PlayerLedState};
use crate::config::PollerSettings;

// Queued host control call
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    SetForceFeedbackChannel {
        slot: usize,
        channel: ForceFeedbackChannel,
        value: f32,
    },
    SetForceFeedbackAll {
        slot: usize,
        values: ForceFeedbackValues,
    },
    SetLed {
        slot: usize,
        leds: PlayerLedState,
    },
    SetLightBar {
        slot: usize,
        light_bar: LightBarState,
    },
    ResetContinuousCalibration {
        slot: usize,
    },
    RequestStateRefresh,
}

impl HostCommand {
    pub fn apply(self, engine: &mut DualSenseInterface) -> Result<(), EngineError> {
        match self {
            HostCommand::SetForceFeedbackChannel {
                slot,
                channel,
                value,
            } => engine.set_force_feedback_channel(slot, channel, value),
            HostCommand::SetForceFeedbackAll { slot, values } => {
                engine.set_force_feedback_all(slot, values)
            }
            HostCommand::SetLed { slot, leds } => engine.set_led(slot, leds),
            HostCommand::SetLightBar { slot, light_bar } => engine.set_light_bar(slot, light_bar),
            HostCommand::ResetContinuousCalibration { slot } => {
                engine.reset_continuous_calibration(slot)
            }
            HostCommand::RequestStateRefresh => engine.request_state_refresh(),
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum PollerState {
    Initializing,
    Polling,
}

#[machine]
pub struct PadPoller<S: PollerState> {
    engine: DualSenseInterface,

    settings: PollerSettings,

    // Host commands, drained before each tick
    commands: mpsc::Receiver<HostCommand>,

    attached: watch::Sender<bool>,

    cancel: CancellationToken,

    ticks: u64,
}

impl<S: PollerState> PadPoller<S> {
    pub fn engine(&self) -> &DualSenseInterface {
        &self.engine
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl PadPoller<Initializing> {
    pub fn create(
        engine: DualSenseInterface,
        settings: PollerSettings,
        commands: mpsc::Receiver<HostCommand>,
        attached: watch::Sender<bool>,
        cancel: CancellationToken,
    ) -> Self {
        debug!("Creating pad poller with settings: {:?}", settings);
        Self::new(engine, settings, commands, attached, cancel, 0)
    }

    /// Publish the attachment status and start polling.
    pub fn initialize(self) -> PadPoller<Polling> {
        let attached = self.engine.is_any_device_attached();
        if self.attached.send(attached).is_err() {
            debug!("No attachment watchers left");
        }
        if attached {
            info!("Pad poller initialized, transitioning to Polling state");
        } else {
            warn!("Pad poller starting without any attached device");
        }
        self.transition()
    }
}

impl PadPoller<Polling> {
    /// Apply every queued command. Returns how many were applied.
    pub fn drain_commands(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.commands.try_recv() {
            debug!("Applying host command: {:?}", command);
            if let Err(e) = command.apply(&mut self.engine) {
                debug!("Host command rejected: {}", e);
            }
            applied += 1;
        }
        applied
    }

    pub fn tick(&mut self) {
        self.drain_commands();
        self.engine.poll();
        self.ticks += 1;
        self.publish_attached();
    }

    // Only wakes watchers when the status flips
    fn publish_attached(&self) {
        let attached = self.engine.is_any_device_attached();
        let changed = self.attached.send_if_modified(|current| {
            if *current == attached {
                return false;
            }
            *current = attached;
            true
        });
        if changed {
            if attached {
                info!("Controller attached again");
            } else {
                warn!("No controller attached");
            }
        }
    }

    /// Tick until cancelled, then hand the engine back.
    pub async fn run_until_cancelled(mut self) -> DualSenseInterface {
        let period = Duration::from_millis(self.settings.tick_interval_ms.max(1));
        info!("Starting pad poller loop every {:?}", period);

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Pad poller cancelled after {} ticks", self.ticks);
                    break;
                }

                _ = interval.tick() => {
                    self.tick();
                }
            }
        }

        self.engine
    }
}

/// Owner side of a running poller task.
pub struct PollerHandle {
    commands: mpsc::Sender<HostCommand>,
    attached: watch::Receiver<bool>,
    cancel: CancellationToken,
    task_handle: Option<JoinHandle<DualSenseInterface>>,
}

impl PollerHandle {
    pub fn spawn(engine: DualSenseInterface, settings: PollerSettings) -> Self {
        let (command_tx, command_rx) = mpsc::channel(100);
        let (attached_tx, attached_rx) = watch::channel(false);
        let cancel = CancellationToken::new();

        let poller = PadPoller::create(engine, settings, command_rx, attached_tx, cancel.clone());
        let task_handle = tokio::spawn(async move {
            let polling = poller.initialize();
            polling.run_until_cancelled().await
        });
        info!("Pad poller task spawned");

        Self {
            commands: command_tx,
            attached: attached_rx,
            cancel,
            task_handle: Some(task_handle),
        }
    }

    pub fn command_sender(&self) -> mpsc::Sender<HostCommand> {
        self.commands.clone()
    }

    pub async fn send(&self, command: HostCommand) -> Result<(), mpsc::error::SendError<HostCommand>> {
        self.commands.send(command).await
    }

    pub fn attached(&self) -> watch::Receiver<bool> {
        self.attached.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the task and return the engine, if the task finished cleanly.
    pub async fn shutdown(&mut self) -> Option<DualSenseInterface> {
        self.cancel.cancel();
        let handle = self.task_handle.take()?;
        match handle.await {
            Ok(engine) => {
                info!("Pad poller shut down");
                Some(engine)
            }
            Err(e) => {
                error!("Pad poller task failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::controller::events::NullSink;
    use crate::controller::output::OutputPacket;
    use crate::controller::sample::RawControllerSample;
    use crate::transport::{Transport, TransportError};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct AlwaysConnected;

    // Slot 0 answers while the flag is set
    struct Unpluggable(Arc<AtomicBool>);

    impl Transport for Unpluggable {
        fn enumerate(&mut self) -> Result<usize, TransportError> {
            Ok(1)
        }

        fn fetch_raw_sample(&mut self, slot: usize) -> Result<RawControllerSample, TransportError> {
            if slot == 0 && self.0.load(Ordering::SeqCst) {
                Ok(RawControllerSample::default())
            } else {
                Err(TransportError::Read {
                    slot,
                    reason: "unplugged".to_string(),
                })
            }
        }

        fn write_output(&mut self, _slot: usize, _packet: &OutputPacket) -> Result<(), TransportError> {
            Ok(())
        }
    }

    impl Transport for AlwaysConnected {
        fn enumerate(&mut self) -> Result<usize, TransportError> {
            Ok(1)
        }

        fn fetch_raw_sample(&mut self, slot: usize) -> Result<RawControllerSample, TransportError> {
            match slot {
                0 => Ok(RawControllerSample::default()),
                _ => Err(TransportError::Read {
                    slot,
                    reason: "empty".to_string(),
                }),
            }
        }

        fn write_output(&mut self, _slot: usize, _packet: &OutputPacket) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn engine() -> DualSenseInterface {
        DualSenseInterface::new(
            EngineConfig::default(),
            Box::new(AlwaysConnected),
            Box::new(NullSink),
        )
    }

    #[test]
    fn commands_are_drained_before_the_tick() {
        let (tx, rx) = mpsc::channel(8);
        let (attached_tx, attached_rx) = watch::channel(false);
        let mut poller = PadPoller::create(
            engine(),
            PollerSettings::default(),
            rx,
            attached_tx,
            CancellationToken::new(),
        )
        .initialize();
        assert!(*attached_rx.borrow());

        poller.tick();
        tx.try_send(HostCommand::SetLed {
            slot: 0,
            leds: PlayerLedState {
                fade: false,
                position: crate::controller::output::LedPosition::Right,
                brightness: Default::default(),
            },
        })
        .unwrap();
        tx.try_send(HostCommand::SetForceFeedbackChannel {
            slot: 0,
            channel: ForceFeedbackChannel::RightSmall,
            value: 0.5,
        })
        .unwrap();
        tx.try_send(HostCommand::SetForceFeedbackChannel {
            slot: 0,
            channel: ForceFeedbackChannel::RightSmall,
            value: 0.25,
        })
        .unwrap();

        poller.tick();
        assert_eq!(poller.ticks(), 2);
        let output = poller.engine().slot(0).unwrap().output();
        // last write wins
        assert_eq!(output.force_feedback.right_small, 0.25);
        assert_eq!(
            output.player_leds.position,
            crate::controller::output::LedPosition::Right
        );
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_poller_ticks_until_shutdown() {
        let mut handle = PollerHandle::spawn(engine(), PollerSettings::default());
        let mut attached = handle.attached();
        attached.changed().await.unwrap();
        assert!(*attached.borrow());

        handle
            .send(HostCommand::ResetContinuousCalibration { slot: 0 })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let engine = handle.shutdown().await.expect("engine returned");
        assert!(engine.slot(0).unwrap().is_connected());
        assert!(engine.motion(0).unwrap().is_tracking());
        assert!(handle.shutdown().await.is_none());
    }

    #[test]
    fn attachment_watch_follows_unplug_and_replug() {
        let plugged = Arc::new(AtomicBool::new(true));
        let engine = DualSenseInterface::new(
            EngineConfig::default(),
            Box::new(Unpluggable(plugged.clone())),
            Box::new(NullSink),
        );
        let (_tx, rx) = mpsc::channel(8);
        let (attached_tx, mut attached_rx) = watch::channel(false);
        let mut poller = PadPoller::create(
            engine,
            PollerSettings::default(),
            rx,
            attached_tx,
            CancellationToken::new(),
        )
        .initialize();
        assert!(*attached_rx.borrow_and_update());

        poller.tick();
        assert!(!attached_rx.has_changed().unwrap());

        plugged.store(false, Ordering::SeqCst);
        poller.tick();
        assert!(attached_rx.has_changed().unwrap());
        assert!(!*attached_rx.borrow_and_update());
        assert!(!poller.engine().slot(0).unwrap().is_connected());

        // still unplugged, no new notification
        poller.tick();
        assert!(!attached_rx.has_changed().unwrap());

        plugged.store(true, Ordering::SeqCst);
        poller.tick();
        assert!(attached_rx.has_changed().unwrap());
        assert!(*attached_rx.borrow_and_update());
    }
}
