//! # PulseKV Client
//!
//! A client library for the PulseKV key-value store protocol with:
//! - Request/response command execution over one persistent WebSocket
//! - Live key and prefix subscriptions (server-initiated pushes)
//! - Challenge/response password authentication
//! - Safe concurrent use from any number of tasks
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Caller Tasks                             │
//! │        (execute / get / set / subscribe / ...)               │
//! └─────────┬──────────────────────────────┬────────────────────┘
//!           │ register                     │ register
//! ┌─────────▼────────────┐      ┌──────────▼──────────────┐
//! │ Pending-Request Table│      │ Subscription Registries  │
//! │   (id → reply slot)  │      │  (exact key / prefix)    │
//! └─────────▲────────────┘      └──────────▲──────────────┘
//!           │ resolve                      │ fan out
//! ┌─────────┴──────────────────────────────┴────────────────────┐
//! │                      Dispatch Loop                           │
//! │        (single reader of the shared connection)              │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │
//!                        ┌──────▼──────┐
//!                        │  WebSocket  │
//!                        └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod options;

pub mod client;
pub mod protocol;
pub mod transport;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use client::{Client, ConnectionState, KeyValuePair, Subscription};
pub use error::{ClientError, Result};
pub use options::ClientOptions;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of the PulseKV client
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
