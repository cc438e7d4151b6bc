//! Client options for PulseKV
//!
//! Centralized connection configuration with sensible defaults.

use std::time::Duration;

use tokio_tungstenite::tungstenite::http::HeaderMap;

/// Options for constructing a [`Client`](crate::Client)
#[derive(Debug, Clone)]
pub struct ClientOptions {
    // -------------------------------------------------------------------------
    // Dial Configuration
    // -------------------------------------------------------------------------
    /// Extra HTTP headers sent with the WebSocket upgrade request
    /// (e.g. an `Authorization` header for proxied deployments)
    pub headers: HeaderMap,

    /// Maximum time to wait for the WebSocket handshake to complete
    pub connect_timeout: Duration,

    // -------------------------------------------------------------------------
    // Authentication
    // -------------------------------------------------------------------------
    /// Server password; when set, the challenge/response handshake runs
    /// during [`Client::connect`](crate::Client::connect)
    pub password: Option<String>,

    // -------------------------------------------------------------------------
    // Request Configuration
    // -------------------------------------------------------------------------
    /// Maximum time a single frame write may take
    pub send_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            headers: HeaderMap::new(),
            connect_timeout: Duration::from_secs(60),
            password: None,
            send_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientOptions {
    /// Create a new options builder
    pub fn builder() -> ClientOptionsBuilder {
        ClientOptionsBuilder::default()
    }
}

/// Builder for ClientOptions
#[derive(Default)]
pub struct ClientOptionsBuilder {
    options: ClientOptions,
}

impl ClientOptionsBuilder {
    /// Set the extra headers for the upgrade request
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.options.headers = headers;
        self
    }

    /// Set the server password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.options.password = Some(password.into());
        self
    }

    /// Set the handshake timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    /// Set the per-frame write timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.options.send_timeout = timeout;
        self
    }

    pub fn build(self) -> ClientOptions {
        self.options
    }
}
