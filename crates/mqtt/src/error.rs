//! Error handling for the broker session.
//!
//! `TransferError` is the single error type returned by the transport crate.
//! Almost every variant is recoverable: the connection manager logs it and
//! retries. The exceptions are `ClientSetup`/`ConfigError` (raised at startup,
//! before any connection is attempted) and `Shutdown` (the operator stopped
//! the process while a caller was waiting for a connection).
//!
//! # Categories
//!
//! **Configuration** (fail fast at startup):
//! - `ClientSetup`
//! - `ConfigError`
//!
//! **Publishing** (event dropped, session marked disconnected):
//! - `Serialization`
//! - `ClientTransfer`
//! - `NotConnected`
//!
//! Handshake failures never surface here: the connection kernel turns them
//! into state transitions and `ensure_connected` retries them.
//!
//! **Lifecycle**:
//! - `Shutdown`

use thiserror::Error;

/// The unified error type for broker session operations.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The MQTT client could not be constructed from the configuration.
    #[error("Client setup error: {0}")]
    ClientSetup(String),

    /// Transport configuration failed validation.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] validator::ValidationErrors),

    /// The payload could not be encoded.
    ///
    /// Never retried: the same event would fail the same way again.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The local client refused to queue a request.
    ///
    /// Happens when the request queue is full (the background task is not
    /// draining it, usually because the session dropped) or when the event
    /// loop has already been torn down.
    #[error("Client transfer error: {0}")]
    ClientTransfer(#[from] rumqttc::ClientError),

    /// A publish was attempted while the session is not connected.
    #[error("Not connected to broker")]
    NotConnected,

    /// Shutdown was requested while the operation was in progress.
    #[error("Shutdown in progress")]
    Shutdown,
}

impl From<serde_json::Error> for TransferError {
    fn from(err: serde_json::Error) -> Self {
        TransferError::Serialization(err.to_string())
    }
}
