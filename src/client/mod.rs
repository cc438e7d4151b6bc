//! Client Module
//!
//! The public operation surface and the shared state behind it.
//!
//! ## Concurrency Model: One Reader / Locked Writer
//!
//! - **Reads**: exactly one dispatch task owns the read half of the
//!   connection for its entire lifetime and routes every incoming message.
//! - **Writes**: any number of caller tasks; each frame write happens under
//!   the write-half mutex, held for one frame.
//! - **Shared tables**: the pending-request table and both subscription
//!   registries are internally synchronized; callers and the dispatch task
//!   never coordinate beyond those locks.
//!
//! ```text
//!   caller ──▶ execute ──▶ PendingRequests ──▶ write half ─┐
//!   caller ──▶ subscribe ─▶ SubscriptionRegistry           │ WebSocket
//!                               ▲                          │
//!                               │ fan-out                  │
//!            dispatch task ◀── read half ◀─────────────────┘
//! ```

mod dispatch;
pub mod pending;
pub mod registry;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::SinkExt;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::{ClientError, Result};
use crate::options::ClientOptions;
use crate::protocol::{
    ErrorReply, Request, Response, CMD_AUTH_CHALLENGE_REQUEST, CMD_AUTH_CHALLENGE_RESPONSE,
    CMD_INTERNAL_CLIENT_ID, CMD_LIST_KEYS, CMD_READ_BULK, CMD_READ_KEY, CMD_READ_PREFIX,
    CMD_SUBSCRIBE_KEY, CMD_SUBSCRIBE_PREFIX, CMD_UNSUBSCRIBE_KEY, CMD_UNSUBSCRIBE_PREFIX,
    CMD_WRITE_BULK, CMD_WRITE_KEY,
};
use crate::transport::{self, WsSink};

use pending::PendingRequests;
use registry::{SelectorMatch, SubscriptionRegistry};

// =============================================================================
// Public Types
// =============================================================================

/// A key and its new value, as delivered by a push notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValuePair {
    pub key: String,
    pub value: String,
}

/// Lifecycle state of the connection's dispatch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Dialed; the dispatch loop has not started reading yet
    Connecting,

    /// The dispatch loop is reading frames
    Reading,

    /// The connection ended cleanly (close frame or owner-initiated close)
    Closed,

    /// The dispatch loop died on a transport or protocol error
    Errored,
}

/// A live subscription's receiving end
///
/// Each subscription owns an independently buffered queue the dispatch loop
/// writes matching pairs into. Keep it and pass it back to the matching
/// unsubscribe call when done; after an unsubscribe (or connection loss)
/// [`recv`](Subscription::recv) drains what was already delivered and then
/// returns `None`.
pub struct Subscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<KeyValuePair>,
}

impl Subscription {
    /// Wait for the next matching key-value pair
    pub async fn recv(&mut self) -> Option<KeyValuePair> {
        self.receiver.recv().await
    }

    /// Take an already-delivered pair without waiting
    pub fn try_recv(&mut self) -> Option<KeyValuePair> {
        self.receiver.try_recv().ok()
    }
}

// =============================================================================
// Shared State
// =============================================================================

/// State shared between the façade and the dispatch task
pub(crate) struct ClientShared {
    /// Write half of the connection; locked per frame write
    writer: tokio::sync::Mutex<WsSink>,

    /// Bound on a single frame write
    send_timeout: Duration,

    /// Outstanding request table (internally synchronized)
    pending: PendingRequests,

    /// Exact-key subscription interest
    key_subs: SubscriptionRegistry,

    /// Prefix subscription interest
    prefix_subs: SubscriptionRegistry,

    /// Dispatch loop lifecycle state
    state: parking_lot::Mutex<ConnectionState>,

    /// Listener slot identity counter, shared by both registries
    listener_ids: AtomicU64,
}

impl ClientShared {
    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }
}

// =============================================================================
// Client
// =============================================================================

/// A PulseKV client over one shared connection
///
/// All operations take `&self`; the client is safe to share across tasks
/// (wrap it in an `Arc` to call it from several).
pub struct Client {
    endpoint: String,
    shared: Arc<ClientShared>,
    dispatch: JoinHandle<()>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint)
            .field("state", &self.shared.state())
            .finish()
    }
}

impl Client {
    /// Dial the endpoint and start the dispatch loop
    ///
    /// When `options.password` is set, the challenge/response handshake runs
    /// before returning; construction fails if it fails, so a client you
    /// hold is always past authentication.
    pub async fn connect(endpoint: &str, options: ClientOptions) -> Result<Self> {
        let (sink, source) = transport::dial(endpoint, &options).await?;

        let shared = Arc::new(ClientShared {
            writer: tokio::sync::Mutex::new(sink),
            send_timeout: options.send_timeout,
            pending: PendingRequests::new(),
            key_subs: SubscriptionRegistry::new(SelectorMatch::Exact),
            prefix_subs: SubscriptionRegistry::new(SelectorMatch::Prefix),
            state: parking_lot::Mutex::new(ConnectionState::Connecting),
            listener_ids: AtomicU64::new(1),
        });

        let dispatch = tokio::spawn(dispatch::run(source, Arc::clone(&shared)));

        let client = Self {
            endpoint: endpoint.to_string(),
            shared,
            dispatch,
        };

        if let Some(password) = options.password.as_deref() {
            client.authenticate(password).await?;
        }

        Ok(client)
    }

    /// The endpoint this client was constructed with
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Current lifecycle state of the connection
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether the dispatch loop is still alive
    pub fn is_connected(&self) -> bool {
        !matches!(
            self.state(),
            ConnectionState::Closed | ConnectionState::Errored
        )
    }

    /// Close the connection
    ///
    /// Sends a close frame; the dispatch loop observes the shutdown and
    /// fails any still-outstanding requests with `ConnectionClosed`.
    pub async fn close(&self) -> Result<()> {
        let mut writer = self.shared.writer.lock().await;
        writer
            .close()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    // =========================================================================
    // Request/Response Façade
    // =========================================================================

    /// Execute a command and wait for its correlated response
    ///
    /// Registers a pending request, sends one frame under the write lock,
    /// and suspends until the dispatch loop resolves the slot. An `ok:
    /// false` reply surfaces as [`ClientError::Server`] with the
    /// server-supplied code and details.
    pub async fn execute(&self, cmd_name: &str, data: Option<Value>) -> Result<Value> {
        let (request_id, slot) = self.shared.pending.allocate()?;

        let request = Request {
            cmd_name: cmd_name.to_string(),
            request_id: request_id.clone(),
            data,
        };
        let frame = serde_json::to_string(&request)?;

        if let Err(e) = self.send_frame(frame).await {
            // Never resolved; drop the entry so the id is reusable
            self.shared.pending.abandon(&request_id);
            return Err(e);
        }
        tracing::debug!("sent request {} ({})", request_id, cmd_name);

        let raw = match slot.await {
            Ok(outcome) => outcome?,
            Err(_) => return Err(ClientError::ConnectionClosed),
        };

        let response: Response = serde_json::from_str(&raw)?;
        if !response.ok {
            let failure: ErrorReply = serde_json::from_str(&raw)?;
            return Err(ClientError::Server {
                code: failure.error,
                details: failure.details,
            });
        }

        Ok(response.data)
    }

    /// Write one frame under the send lock
    async fn send_frame(&self, frame: String) -> Result<()> {
        let mut writer = self.shared.writer.lock().await;
        tokio::time::timeout(self.shared.send_timeout, writer.send(Message::Text(frame)))
            .await
            .map_err(|_| {
                ClientError::Transport(format!(
                    "send timed out after {:?}",
                    self.shared.send_timeout
                ))
            })?
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    /// Run the password challenge/response handshake
    ///
    /// Fetches a challenge and salt, computes an HMAC-SHA256 over the
    /// challenge bytes keyed by the password concatenated with the salt,
    /// and submits the base64 digest as the second round trip.
    pub async fn authenticate(&self, password: &str) -> Result<()> {
        let data = self.execute(CMD_AUTH_CHALLENGE_REQUEST, None).await?;

        let challenge = decode_base64_field(&data, "challenge")?;
        let salt = decode_base64_field(&data, "salt")?;

        let mut key = password.as_bytes().to_vec();
        key.extend_from_slice(&salt);
        let mut mac = Hmac::<Sha256>::new_from_slice(&key)
            .map_err(|e| ClientError::Auth(format!("invalid HMAC key: {}", e)))?;
        mac.update(&challenge);
        let digest = mac.finalize().into_bytes();

        self.execute(
            CMD_AUTH_CHALLENGE_RESPONSE,
            Some(json!({ "hash": BASE64.encode(digest) })),
        )
        .await?;
        Ok(())
    }

    // =========================================================================
    // Key Operations
    // =========================================================================

    /// Get a key's value as a string
    ///
    /// An unset key reads back as the empty string by server convention.
    pub async fn get_key(&self, key: &str) -> Result<String> {
        let data = self.execute(CMD_READ_KEY, Some(json!({ "key": key }))).await?;
        expect_string(data, CMD_READ_KEY)
    }

    /// Get several keys in one round trip
    pub async fn get_keys(&self, keys: &[&str]) -> Result<HashMap<String, String>> {
        let data = self
            .execute(CMD_READ_BULK, Some(json!({ "keys": keys })))
            .await?;
        expect_string_map(data, CMD_READ_BULK)
    }

    /// Get every key-value pair under a prefix
    pub async fn get_by_prefix(&self, prefix: &str) -> Result<HashMap<String, String>> {
        let data = self
            .execute(CMD_READ_PREFIX, Some(json!({ "prefix": prefix })))
            .await?;
        expect_string_map(data, CMD_READ_PREFIX)
    }

    /// Get a key's value deserialized from its stored JSON
    ///
    /// Fails with [`ClientError::EmptyKey`] when the key is empty or unset,
    /// since an empty string is not a JSON document.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let data = self.execute(CMD_READ_KEY, Some(json!({ "key": key }))).await?;
        let raw = expect_string(data, CMD_READ_KEY)?;
        if raw.is_empty() {
            return Err(ClientError::EmptyKey);
        }
        Ok(serde_json::from_str(&raw)?)
    }

    /// Set a key to a string value
    pub async fn set_key(&self, key: &str, value: &str) -> Result<()> {
        self.execute(CMD_WRITE_KEY, Some(json!({ "key": key, "data": value })))
            .await?;
        Ok(())
    }

    /// Set several keys in one round trip
    pub async fn set_keys(&self, entries: &HashMap<String, String>) -> Result<()> {
        self.execute(CMD_WRITE_BULK, Some(serde_json::to_value(entries)?))
            .await?;
        Ok(())
    }

    /// Set a key to a value's JSON serialization
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let serialized = serde_json::to_string(value)?;
        self.execute(CMD_WRITE_KEY, Some(json!({ "key": key, "data": serialized })))
            .await?;
        Ok(())
    }

    /// Set several keys to their values' JSON serializations
    pub async fn set_jsons<T: Serialize>(&self, entries: &HashMap<String, T>) -> Result<()> {
        let mut serialized = serde_json::Map::with_capacity(entries.len());
        for (key, value) in entries {
            serialized.insert(key.clone(), Value::String(serde_json::to_string(value)?));
        }
        self.execute(CMD_WRITE_BULK, Some(Value::Object(serialized)))
            .await?;
        Ok(())
    }

    /// List key names under a prefix
    pub async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let data = self
            .execute(CMD_LIST_KEYS, Some(json!({ "prefix": prefix })))
            .await?;
        match data {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(key) => Some(key),
                    _ => None,
                })
                .collect()),
            Value::Null => Ok(Vec::new()),
            other => Err(unexpected_result(CMD_LIST_KEYS, &other)),
        }
    }

    /// Fetch the server-assigned identifier for this connection
    pub async fn client_id(&self) -> Result<i64> {
        let data = self.execute(CMD_INTERNAL_CLIENT_ID, None).await?;
        data.as_i64()
            .ok_or_else(|| unexpected_result(CMD_INTERNAL_CLIENT_ID, &data))
    }

    // =========================================================================
    // Subscription Façade
    // =========================================================================

    /// Subscribe to pushes for an exact key
    pub async fn subscribe_key(&self, key: &str) -> Result<Subscription> {
        self.subscribe(&self.shared.key_subs, CMD_SUBSCRIBE_KEY, "key", key)
            .await
    }

    /// Stop a key subscription
    ///
    /// Fails with [`ClientError::SubscriptionNotFound`] when the handle is
    /// not registered under `key`.
    pub async fn unsubscribe_key(&self, key: &str, subscription: Subscription) -> Result<()> {
        self.unsubscribe(
            &self.shared.key_subs,
            CMD_UNSUBSCRIBE_KEY,
            "key",
            key,
            subscription,
        )
        .await
    }

    /// Subscribe to pushes for every key under a prefix
    pub async fn subscribe_prefix(&self, prefix: &str) -> Result<Subscription> {
        self.subscribe(
            &self.shared.prefix_subs,
            CMD_SUBSCRIBE_PREFIX,
            "prefix",
            prefix,
        )
        .await
    }

    /// Stop a prefix subscription
    pub async fn unsubscribe_prefix(&self, prefix: &str, subscription: Subscription) -> Result<()> {
        self.unsubscribe(
            &self.shared.prefix_subs,
            CMD_UNSUBSCRIBE_PREFIX,
            "prefix",
            prefix,
            subscription,
        )
        .await
    }

    /// Register a listener slot, telling the server only on 0→1
    ///
    /// The slot registers locally before the server round trip. If that
    /// round trip fails the registration intentionally stays and the error
    /// propagates; local and server interest can disagree until the next
    /// transition. Callers that hit this should unsubscribe and retry.
    async fn subscribe(
        &self,
        registry: &SubscriptionRegistry,
        cmd_name: &str,
        field: &str,
        selector: &str,
    ) -> Result<Subscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.shared.listener_ids.fetch_add(1, Ordering::Relaxed);
        let first = registry.add_listener(selector, id, sender);

        if first {
            self.execute(cmd_name, Some(json!({ field: selector })))
                .await?;
        }

        Ok(Subscription { id, receiver })
    }

    /// Remove a listener slot, telling the server only on 1→0
    async fn unsubscribe(
        &self,
        registry: &SubscriptionRegistry,
        cmd_name: &str,
        field: &str,
        selector: &str,
        subscription: Subscription,
    ) -> Result<()> {
        let now_empty = registry.remove_listener(selector, subscription.id)?;

        if now_empty {
            self.execute(cmd_name, Some(json!({ field: selector })))
                .await?;
        }

        Ok(())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // The dispatch task holds the read half; stop it with the client
        self.dispatch.abort();
    }
}

// =============================================================================
// Result Coercion Helpers
// =============================================================================

fn unexpected_result(cmd_name: &str, data: &Value) -> ClientError {
    ClientError::Protocol(format!("{} returned unexpected result: {}", cmd_name, data))
}

/// Coerce a command result into a string; null reads as the unset value
fn expect_string(data: Value, cmd_name: &str) -> Result<String> {
    match data {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => Err(unexpected_result(cmd_name, &other)),
    }
}

/// Coerce a command result into a string-to-string map
fn expect_string_map(data: Value, cmd_name: &str) -> Result<HashMap<String, String>> {
    match data {
        Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| match value {
                Value::String(s) => Ok((key, s)),
                other => Err(unexpected_result(cmd_name, &other)),
            })
            .collect(),
        Value::Null => Ok(HashMap::new()),
        other => Err(unexpected_result(cmd_name, &other)),
    }
}

fn decode_base64_field(data: &Value, field: &str) -> Result<Vec<u8>> {
    let encoded = data
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::Auth(format!("challenge response missing {}", field)))?;
    BASE64
        .decode(encoded)
        .map_err(|e| ClientError::Auth(format!("failed to decode {}: {}", field, e)))
}
