//! Error types for the PulseKV client
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using ClientError
pub type Result<T> = std::result::Result<T, ClientError>;

/// Unified error type for PulseKV client operations
#[derive(Debug, Error)]
pub enum ClientError {
    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("dial failed: {0}")]
    Dial(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection closed")]
    ConnectionClosed,

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Server rejected a command; carries the server-supplied code and details
    #[error("server error: {code}: {details}")]
    Server { code: String, details: String },

    // -------------------------------------------------------------------------
    // Authentication Errors
    // -------------------------------------------------------------------------
    #[error("authentication failed: {0}")]
    Auth(String),

    // -------------------------------------------------------------------------
    // Subscription / Key Errors
    // -------------------------------------------------------------------------
    #[error("subscription not found")]
    SubscriptionNotFound,

    #[error("key empty or unset")]
    EmptyKey,
}
