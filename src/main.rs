use std::path::PathBuf;

use color_eyre::{eyre::eyre, Result};
use padfusion::config::EngineConfig;
use padfusion::controller::{
    ChannelSink, ControllerEvent, DualSenseInterface, HostCommand, LedBrightness, LedPosition,
    PlayerLedState, PollerHandle, StampedEvent, MAX_CONTROLLERS,
};
use padfusion::module::{FeatureRegistry, KeyDetails, PadModule};
use padfusion::transport::ReplayTransport;
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

// Registry that only logs what the module registers
struct LoggingRegistry;

impl FeatureRegistry for LoggingRegistry {
    fn register_feature(&mut self, feature: &str, module: &str) {
        info!("Registered feature {} for module {}", feature, module);
    }

    fn unregister_feature(&mut self, feature: &str, module: &str) {
        info!("Unregistered feature {} for module {}", feature, module);
    }

    fn register_key(&mut self, key: KeyDetails) {
        debug!("Registered key {} ({})", key.name, key.display_name);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = EngineConfig::default_path();
    EngineConfig::ensure_default(&config_path)?;
    let config = EngineConfig::load(&config_path)?;

    let capture_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or_else(|| eyre!("Usage: padfusion <capture.toml>"))?;
    let transport = ReplayTransport::load(&capture_path)
        .map_err(|e| eyre!("Failed to load capture {}: {}", capture_path.display(), e))?;
    let output_log = transport.output_log();

    let mut registry = LoggingRegistry;
    let mut module = PadModule::new(config.clone());
    module.startup(&mut registry);

    // A quarter of this stays free for button and connection edges
    let (event_tx, mut event_rx) = mpsc::channel::<StampedEvent>(1000);
    let engine = DualSenseInterface::new(
        config.clone(),
        Box::new(transport),
        Box::new(ChannelSink::new(event_tx)),
    );
    let mut poller = PollerHandle::spawn(engine, config.poller.clone());
    let commands = poller.command_sender();

    info!("Replaying {}, press Ctrl+C to stop", capture_path.display());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down");
                break;
            }

            event = event_rx.recv() => {
                let Some(stamped) = event else {
                    warn!("Event channel closed");
                    break;
                };
                log_event(&stamped);

                if let ControllerEvent::ConnectionChanged { connected: true, slot } = stamped.event {
                    let leds = PlayerLedState {
                        fade: true,
                        position: LedPosition::from_index(slot as i32 + 1),
                        brightness: LedBrightness::High,
                    };
                    if let Err(e) = commands.send(HostCommand::SetLed { slot, leds }).await {
                        warn!("Failed to queue LED command: {}", e);
                    }
                }
            }
        }
    }

    poller.shutdown().await;
    module.shutdown(&mut registry);

    for slot in 0..MAX_CONTROLLERS {
        if let Some(packet) = output_log.last(slot) {
            info!("Last output for slot {}: {:?}", slot, packet);
        }
    }

    Ok(())
}

fn log_event(stamped: &StampedEvent) {
    let at = stamped.timestamp.format("%H:%M:%S.%3f");
    match &stamped.event {
        ControllerEvent::AnalogChanged { axis, slot, value } => {
            debug!("[{}] slot {} {:?} = {:.4}", at, slot, axis, value)
        }
        ControllerEvent::ButtonPressed {
            button,
            slot,
            is_repeat,
        } => info!(
            "[{}] slot {} pressed {} (repeat: {})",
            at,
            slot,
            button.key_name(),
            is_repeat
        ),
        ControllerEvent::ButtonReleased { button, slot } => {
            info!("[{}] slot {} released {}", at, slot, button.key_name())
        }
        ControllerEvent::ConnectionChanged { connected, slot } => {
            info!("[{}] slot {} connected: {}", at, slot, connected)
        }
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
