//! Error types for relay-tunnel.

use thiserror::Error;

use crate::session::Feature;

/// Main error type for relay-tunnel operations.
#[derive(Error, Debug)]
pub enum TunnelError {
    /// The relay store rejected or failed a request.
    #[error("relay error: {0}")]
    Relay(String),

    /// HTTP client error (relay transport or local forwarding).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// PTY-related error.
    #[error("PTY error: {0}")]
    Pty(String),

    /// Session id contains characters the relay store cannot address.
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// Unknown feature name.
    #[error("invalid feature: {0}")]
    InvalidFeature(String),

    /// Feature is switched off in the orchestrator.
    #[error("feature disabled: {0}")]
    FeatureDisabled(Feature),

    /// A start/stop request carried no session id.
    #[error("session id is required")]
    MissingSessionId,

    /// A session with the same key is already live.
    #[error("session already running: {0}")]
    AlreadyRunning(String),

    /// No live session matches the key.
    #[error("no such session: {0}")]
    NoSuchSession(String),

    /// Unknown orchestrator action.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// A relayed request id is already waiting for a response.
    #[error("duplicate request id: {0}")]
    DuplicateRequest(String),

    /// A relayed request cannot be turned into a local call.
    #[error("invalid relayed request: {0}")]
    InvalidRequest(String),

    /// Tunnel endpoint process could not be spawned.
    #[error("failed to spawn session process: {0}")]
    Spawn(String),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,
}

/// Convenience Result type for relay-tunnel operations.
pub type Result<T> = std::result::Result<T, TunnelError>;
