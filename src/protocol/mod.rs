//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Protocol Format (JSON object per line)
//!
//! Every protocol message is a single JSON object. A transport frame may
//! carry several messages joined by `\n`:
//!
//! ```text
//! {"cmdName":"write-key","requestId":"9f3c...","data":{"key":"a","data":"1"}}
//! {"requestId":"9f3c...","ok":true,"data":null}
//! {"cmdType":"push","key":"a","newValue":"1"}
//! ```
//!
//! ### Message Kinds
//! - Request:  `{cmdName, requestId, data}` — client → server
//! - Response: `{requestId, ok: true, data}` — correlated by `requestId`
//! - Error:    `{requestId, ok: false, error, details}`
//! - Push:     `{cmdType: "push", key, newValue}` — uncorrelated, server → client

mod commands;
mod message;

pub use commands::*;
pub use message::{Envelope, ErrorReply, Push, Request, Response, PUSH_TYPE};
