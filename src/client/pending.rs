//! Pending-Request Table
//!
//! Maps each in-flight request identifier to the waiting caller's delivery
//! slot. The dispatch loop resolves a slot at most once; the entry is
//! removed in the same lock acquisition so no identifier stays live after
//! its response arrived.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{ClientError, Result};

/// Receiver half of a single-use delivery slot
///
/// Yields the raw response text, or the connection-loss error when the
/// dispatch loop died before a response arrived.
pub type ReplySlot = oneshot::Receiver<Result<String>>;

/// Table of outstanding requests awaiting their correlated response
pub struct PendingRequests {
    inner: Mutex<Inner>,
}

struct Inner {
    slots: HashMap<String, oneshot::Sender<Result<String>>>,
    /// Set by [`PendingRequests::fail_all`]; shares the map's lock so no
    /// request can register after the loss broadcast has drained the table
    closed: bool,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Register a new outstanding request
    ///
    /// Generates a fresh 64-bit random hex identifier, retrying on the
    /// (theoretical) collision with a currently outstanding one, and
    /// inserts its delivery slot. Fails with `ConnectionClosed` once the
    /// table has been shut down.
    pub fn allocate(&self) -> Result<(String, ReplySlot)> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(ClientError::ConnectionClosed);
        }

        let id = loop {
            let candidate = format!("{:016x}", rand::random::<u64>());
            if !inner.slots.contains_key(&candidate) {
                break candidate;
            }
        };

        let (tx, rx) = oneshot::channel();
        inner.slots.insert(id.clone(), tx);
        Ok((id, rx))
    }

    /// Deliver a response to the slot registered under `id`
    ///
    /// Removes the entry and hands the raw message to the waiting caller
    /// without ever blocking the dispatch loop. Returns false when `id` is
    /// unknown — a protocol anomaly the caller should log, not crash on.
    pub fn resolve(&self, id: &str, message: String) -> bool {
        let slot = self.inner.lock().slots.remove(id);
        match slot {
            Some(tx) => {
                // A dropped receiver means the caller gave up on the wait;
                // the response is discarded either way.
                let _ = tx.send(Ok(message));
                true
            }
            None => false,
        }
    }

    /// Remove an entry without resolving it
    ///
    /// Used when the send failed after allocation, so the identifier can be
    /// reused immediately.
    pub fn abandon(&self, id: &str) {
        self.inner.lock().slots.remove(id);
    }

    /// Fail every outstanding request with `ConnectionClosed` and refuse
    /// all future allocations
    pub fn fail_all(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        for (_, tx) in inner.slots.drain() {
            let _ = tx.send(Err(ClientError::ConnectionClosed));
        }
    }

    /// Number of requests currently awaiting a response
    pub fn outstanding(&self) -> usize {
        self.inner.lock().slots.len()
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}
