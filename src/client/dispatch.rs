//! Dispatch Loop
//!
//! The single reader of the connection. Pulls frames off the transport,
//! splits coalesced frames into their newline-delimited messages, and
//! routes each one: correlated responses to the pending-request table,
//! pushes to the matching subscription listeners.
//!
//! The loop runs `Connecting → Reading → (Closed | Errored)`. On either
//! terminal state it broadcasts the loss: every pending request resolves
//! with a connection-closed error and both registries are cleared so
//! subscription receivers observe end-of-stream instead of hanging.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::Result;
use crate::protocol::{Envelope, Push};
use crate::transport::WsSource;

use super::{ClientShared, ConnectionState, KeyValuePair};

/// Run the dispatch loop until the connection dies, then broadcast the loss
pub(crate) async fn run(mut source: WsSource, shared: Arc<ClientShared>) {
    shared.set_state(ConnectionState::Reading);
    tracing::debug!("dispatch loop reading");

    let terminal = read_loop(&mut source, &shared).await;

    shared.set_state(terminal);
    shared.pending.fail_all();
    shared.key_subs.clear();
    shared.prefix_subs.clear();
    tracing::debug!("dispatch loop exited: {:?}", terminal);
}

/// Read frames until a terminal condition, returning the state to publish
async fn read_loop(source: &mut WsSource, shared: &ClientShared) -> ConnectionState {
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                // One frame may coalesce several protocol messages
                for message in text.split('\n') {
                    if message.is_empty() {
                        continue;
                    }
                    if let Err(e) = route_message(message, shared) {
                        // A message we cannot parse means the stream is no
                        // longer trustworthy for correlation
                        tracing::error!("message dispatch failed: {}", e);
                        return ConnectionState::Errored;
                    }
                }
            }
            // Only text frames carry protocol data
            Ok(Message::Binary(_)) | Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Frame(_)) => {}
            Ok(Message::Close(_)) => {
                tracing::debug!("server closed the connection");
                return ConnectionState::Closed;
            }
            Err(e) => {
                tracing::error!("transport read error: {}", e);
                return ConnectionState::Errored;
            }
        }
    }
    ConnectionState::Closed
}

/// Classify one message and route it to the right table
fn route_message(raw: &str, shared: &ClientShared) -> Result<()> {
    let envelope: Envelope = serde_json::from_str(raw)?;

    if envelope.is_response() {
        tracing::trace!("recv response for {}", envelope.request_id);
        if !shared.pending.resolve(&envelope.request_id, raw.to_string()) {
            tracing::warn!(
                "received response for unknown request id {}",
                envelope.request_id
            );
        }
    } else if envelope.is_push() {
        let push: Push = serde_json::from_str(raw)?;
        tracing::trace!("recv push for {}", push.key);
        fan_out(&push, shared);
    } else {
        tracing::debug!("ignoring untyped message without request id");
    }

    Ok(())
}

/// Deliver a push to every matching listener slot on both registries
///
/// Each slot gets its own copy of the pair; the slots are unbounded queues,
/// so a slow consumer never stalls the loop or its neighbors.
fn fan_out(push: &Push, shared: &ClientShared) {
    let exact = shared.key_subs.matching_listeners(&push.key);
    let prefixed = shared.prefix_subs.matching_listeners(&push.key);

    for slot in exact.into_iter().chain(prefixed) {
        // A send error means the receiver was dropped without
        // unsubscribing; the remaining listeners still get theirs
        let _ = slot.send(KeyValuePair {
            key: push.key.clone(),
            value: push.new_value.clone(),
        });
    }
}
