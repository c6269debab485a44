use crate::transport::DisconnectReason;
use thiserror::Error;

/// Library result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when running the bridge.
///
/// Background failures (transport close, credential I/O, webhook delivery)
/// are handled inside their owning component and surfaced as events; these
/// types reach callers only on the synchronous paths (connect handshake,
/// send, control-surface input validation).
#[derive(Error, Debug)]
pub enum Error {
    #[error("connection: {0}")]
    Connection(#[from] ConnectionError),

    #[error("pairing: {0}")]
    Pairing(#[from] PairingError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("send: {0}")]
    Send(#[from] SendError),

    #[error("webhook: {0}")]
    Webhook(#[from] WebhookError),

    #[error("not connected")]
    NotConnected,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Connection-related errors.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("timeout")]
    Timeout,

    #[error("disconnected")]
    Disconnected,

    #[error("closed: {0}")]
    Closed(DisconnectReason),
}

/// Pairing-related errors (attempt-scoped, surfaced as `auth.failure`).
#[derive(Error, Debug)]
pub enum PairingError {
    #[error("phoneNumber is empty")]
    MissingPhoneNumber,

    #[error("pairing code request failed: {0}")]
    RequestFailed(String),
}

/// Credential store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("save failed: {0}")]
    Save(String),

    #[error("load failed: {0}")]
    Load(String),

    #[error("wipe failed: {0}")]
    Wipe(String),
}

/// Send message errors.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("timeout waiting for response")]
    Timeout,

    #[error("server error: {0}")]
    Server(String),
}

/// Webhook configuration errors. Delivery failures are never surfaced as
/// errors: the dispatcher logs and swallows them (at-most-once, best-effort).
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("invalid webhook url: {0}")]
    InvalidUrl(String),

    #[error("no webhook configured")]
    NotConfigured,
}
