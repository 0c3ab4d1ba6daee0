//! Per-slot connect/disconnect edge detection.

use tracing::{info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionChange {
    Unchanged,
    JustConnected,
    JustDisconnected,
}

impl ConnectionChange {
    pub fn is_edge(self) -> bool {
        self != ConnectionChange::Unchanged
    }
}

/// Liveness of one slot, driven by whether this tick's sample fetch succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionTracker {
    slot: usize,
    connected: bool,
    ever_connected: bool,
}

impl ConnectionTracker {
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            connected: false,
            ever_connected: false,
        }
    }

    pub fn update(&mut self, sample_ok: bool) -> ConnectionChange {
        let change = match (self.connected, sample_ok) {
            (false, true) => {
                info!("Controller connected on slot {}", self.slot);
                self.ever_connected = true;
                ConnectionChange::JustConnected
            }
            (true, false) => {
                warn!("Controller disconnected from slot {}", self.slot);
                ConnectionChange::JustDisconnected
            }
            _ => ConnectionChange::Unchanged,
        };

        if change == ConnectionChange::Unchanged && !self.ever_connected {
            trace!("Slot {} has never produced a sample", self.slot);
        }

        self.connected = sample_ok;
        change
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn ever_connected(&self) -> bool {
        self.ever_connected
    }
}
