//! WebSocket transport
//!
//! Owns dialing and the split-stream plumbing. The rest of the crate only
//! sees the write half (guarded by the client's send lock) and the read
//! half (owned exclusively by the dispatch loop).

use futures_util::stream::{SplitSink, SplitStream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{ClientError, Result};
use crate::options::ClientOptions;

/// The connected WebSocket stream type
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the split stream
pub type WsSink = SplitSink<WsStream, Message>;

/// Read half of the split stream
pub type WsSource = SplitStream<WsStream>;

/// Rewrite an HTTP(S) endpoint into its WebSocket equivalent
///
/// `http://` becomes `ws://`, `https://` becomes `wss://`; endpoints that
/// already carry a `ws://`/`wss://` scheme pass through, and bare
/// `host:port` endpoints default to `ws://`.
pub fn resolve_ws_url(endpoint: &str) -> String {
    if let Some(rest) = endpoint.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        endpoint.to_string()
    } else {
        format!("ws://{}", endpoint)
    }
}

/// Dial the endpoint and split the connection into its two halves
///
/// Applies the caller's extra headers to the upgrade request and bounds the
/// whole handshake by `options.connect_timeout`.
pub async fn dial(endpoint: &str, options: &ClientOptions) -> Result<(WsSink, WsSource)> {
    let url = resolve_ws_url(endpoint);

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| ClientError::Dial(format!("invalid endpoint {}: {}", url, e)))?;
    for (name, value) in options.headers.iter() {
        request.headers_mut().insert(name, value.clone());
    }

    tracing::debug!("dialing {}", url);

    let connected = tokio::time::timeout(options.connect_timeout, connect_async(request))
        .await
        .map_err(|_| {
            ClientError::Dial(format!(
                "handshake timed out after {:?}",
                options.connect_timeout
            ))
        })?
        .map_err(|e| ClientError::Dial(e.to_string()))?;

    let (stream, _response) = connected;
    Ok(stream.split())
}
