//! Message envelopes
//!
//! Serde representations of the JSON-per-line wire messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type tag carried by key-value push notifications
pub const PUSH_TYPE: &str = "push";

/// An outgoing command request
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Command name, e.g. `read-key`
    #[serde(rename = "cmdName")]
    pub cmd_name: String,

    /// Correlation identifier, unique among outstanding requests
    #[serde(rename = "requestId")]
    pub request_id: String,

    /// Command-specific payload; omitted entirely when the command takes none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A successful (or at least well-formed) command response
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    #[serde(default, rename = "requestId")]
    pub request_id: String,

    #[serde(default)]
    pub ok: bool,

    /// Command result; shape depends on the command
    #[serde(default)]
    pub data: Value,
}

/// A failed command response
///
/// Re-parsed from the same message as [`Response`] when `ok` is false.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorReply {
    #[serde(default, rename = "requestId")]
    pub request_id: String,

    /// Server error code
    #[serde(default)]
    pub error: String,

    /// Human-readable details
    #[serde(default)]
    pub details: String,
}

/// A server-initiated key-value notification
#[derive(Debug, Clone, Deserialize)]
pub struct Push {
    #[serde(default, rename = "cmdType")]
    pub cmd_type: String,

    #[serde(default)]
    pub key: String,

    #[serde(default, rename = "newValue")]
    pub new_value: String,
}

/// Minimal classification view of any incoming message
///
/// The dispatch loop parses this first to decide whether a message is a
/// correlated response (`request_id` present) or a typed notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default, rename = "requestId")]
    pub request_id: String,

    #[serde(default, rename = "cmdType")]
    pub cmd_type: String,
}

impl Envelope {
    /// Whether this message correlates to an outstanding request
    pub fn is_response(&self) -> bool {
        !self.request_id.is_empty()
    }

    /// Whether this message is a key-value push
    pub fn is_push(&self) -> bool {
        self.cmd_type == PUSH_TYPE
    }
}
