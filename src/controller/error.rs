use crate::transport::TransportError;

// Engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Device enumeration failed: {0}")]
    EnumerationFailure(String),

    #[error("Failed to read slot {slot}: {source}")]
    TransportReadFailure {
        slot: usize,
        #[source]
        source: TransportError,
    },

    #[error("Slot {0} is out of range")]
    SlotOutOfRange(usize),

    #[error("Slot {0} is not connected")]
    SlotNotConnected(usize),
}
