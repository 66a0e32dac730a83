//! Error types for fieldgate-core.
//!
//! Errors carry human-readable text; there is no numeric code taxonomy.
//! The classes map to how callers should react:
//!
//! | Class | Variants | Recovery |
//! |-------|----------|----------|
//! | Configuration | [`Error::InvalidConfig`] | Fix the argument, call again |
//! | Resource | [`Error::NoAudioEndpoint`], [`Error::NotConnected`] | Connect/resolve first |
//! | Link | [`Error::ConnectFailed`], [`Error::LinkLost`] | Re-scan and reconnect |
//! | Streaming | [`Error::Stream`] | Re-invoke the capture if desired |
//!
//! Nothing here is fatal: every failure leaves the link manager in a
//! well-defined idle or connected state, ready for the next call.
//! Non-fatal data-quality warnings (packet drops during an otherwise
//! successful capture) travel in the capture summary, not as errors.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the Fieldgate link core.
///
/// Marked `#[non_exhaustive]` so new variants can be added without breaking
/// downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy stack error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Invalid argument, rejected before any stack interaction.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation attempted without an active session.
    #[error("Not connected to a device")]
    NotConnected,

    /// Connection attempt failed on every address kind.
    #[error("Connection failed: {address}: {reason}")]
    ConnectFailed {
        /// The address that failed to connect.
        address: String,
        /// Stack-level reason text.
        reason: String,
    },

    /// The link dropped while an operation was in progress, or a silent
    /// disconnect was detected.
    #[error("Connection lost")]
    LinkLost,

    /// No audio stream endpoint could be resolved on the connected device.
    #[error("No audio stream characteristic found")]
    NoAudioEndpoint,

    /// A capture-path failure: subscribe failure, startup or inactivity
    /// timeout, or insufficient total data. The in-progress output file
    /// has been deleted.
    #[error("{0}")]
    Stream(String),

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// I/O error while writing the capture file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a connect failure with stack-level reason text.
    pub fn connect_failed(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Create a streaming error with a specific reason.
    pub fn stream(reason: impl Into<String>) -> Self {
        Self::Stream(reason.into())
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }
}

/// Result type alias using fieldgate-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
