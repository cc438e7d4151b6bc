//! Command names
//!
//! Wire names for every command the server recognizes.

/// Read a single key; data: `{key}`, result: string
pub const CMD_READ_KEY: &str = "read-key";

/// Read several keys at once; data: `{keys: [..]}`, result: `{key: value, ..}`
pub const CMD_READ_BULK: &str = "read-bulk";

/// Read every key under a prefix; data: `{prefix}`, result: `{key: value, ..}`
pub const CMD_READ_PREFIX: &str = "read-prefix";

/// Write a single key; data: `{key, data}`
pub const CMD_WRITE_KEY: &str = "write-key";

/// Write several keys at once; data: `{key: value, ..}`
pub const CMD_WRITE_BULK: &str = "write-bulk";

/// List key names under a prefix; data: `{prefix}`, result: `[key, ..]`
pub const CMD_LIST_KEYS: &str = "list-keys";

/// Start pushing updates for an exact key; data: `{key}`
pub const CMD_SUBSCRIBE_KEY: &str = "subscribe-key";

/// Stop pushing updates for an exact key; data: `{key}`
pub const CMD_UNSUBSCRIBE_KEY: &str = "unsubscribe-key";

/// Start pushing updates for every key under a prefix; data: `{prefix}`
pub const CMD_SUBSCRIBE_PREFIX: &str = "subscribe-prefix";

/// Stop pushing updates for a prefix; data: `{prefix}`
pub const CMD_UNSUBSCRIBE_PREFIX: &str = "unsubscribe-prefix";

/// Request an auth challenge; no data, result: `{challenge, salt}` (base64)
pub const CMD_AUTH_CHALLENGE_REQUEST: &str = "auth-challenge-request";

/// Answer an auth challenge; data: `{hash}` (base64 HMAC-SHA256 digest)
pub const CMD_AUTH_CHALLENGE_RESPONSE: &str = "auth-challenge-response";

/// Fetch the server-assigned connection identifier; no data, result: integer
pub const CMD_INTERNAL_CLIENT_ID: &str = "internal-client-id";
