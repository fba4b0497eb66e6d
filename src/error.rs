//! Error types for control construction, dispatch and feedback

use thiserror::Error;

/// Errors raised by controls and the dispatcher
#[derive(Debug, Error)]
pub enum ControlError {
    /// MIDI channel outside 0-15
    #[error("invalid MIDI channel {0} (expected 0-15)")]
    InvalidChannel(u8),

    /// CC number outside 0-127
    #[error("invalid CC number {0} (expected 0-127)")]
    InvalidCcNumber(u8),

    /// Feedback value outside 0-127
    #[error("invalid CC value {0} (expected 0-127)")]
    InvalidValue(u8),

    /// Double-click timeout that is negative or not finite
    #[error("invalid double-click timeout {0}s")]
    InvalidTimeout(f64),

    /// A user callback returned an error
    #[error("callback for {control} failed: {source}")]
    Callback {
        control: String,
        source: anyhow::Error,
    },

    /// The feedback sink refused a write
    #[error("feedback write for {control} failed: {source}")]
    Feedback {
        control: String,
        source: anyhow::Error,
    },
}

pub type Result<T, E = ControlError> = std::result::Result<T, E>;
