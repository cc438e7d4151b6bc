//! Subscription Registry
//!
//! Maps selectors (exact keys or prefixes) to the listener slots interested
//! in them. The same structure is instantiated twice by the client, once
//! per matching mode; all operations are atomic under the registry's lock,
//! so a push fanning out concurrently with a subscribe/unsubscribe observes
//! either the pre- or post-mutation listener set, never a partial one.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{ClientError, Result};

use super::KeyValuePair;

/// How a registry's selectors match incoming push keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorMatch {
    /// A selector matches only the identical key
    Exact,

    /// A selector matches every key it is a string-prefix of
    /// (the empty selector matches everything)
    Prefix,
}

/// A registered listener slot, removable by identity
struct Listener {
    id: u64,
    sender: UnboundedSender<KeyValuePair>,
}

/// Registry of listener slots keyed by selector
pub struct SubscriptionRegistry {
    mode: SelectorMatch,
    inner: Mutex<HashMap<String, Vec<Listener>>>,
}

impl SubscriptionRegistry {
    pub fn new(mode: SelectorMatch) -> Self {
        Self {
            mode,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Append a listener slot to the selector's entry
    ///
    /// Returns whether this was the selector's first listener, i.e. local
    /// interest transitioned 0→1 and the caller must issue the server-side
    /// subscribe command.
    pub fn add_listener(
        &self,
        selector: &str,
        id: u64,
        sender: UnboundedSender<KeyValuePair>,
    ) -> bool {
        let mut inner = self.inner.lock();
        let entry = inner.entry(selector.to_string()).or_default();
        let first = entry.is_empty();
        entry.push(Listener { id, sender });
        first
    }

    /// Remove the listener slot registered under `selector` with this id
    ///
    /// Returns whether the entry is now empty (interest transitioned to 0,
    /// the caller must issue the server-side unsubscribe command). An
    /// emptied entry is removed from the map outright. Fails with
    /// `SubscriptionNotFound` when no such slot is registered under that
    /// selector.
    pub fn remove_listener(&self, selector: &str, id: u64) -> Result<bool> {
        let mut inner = self.inner.lock();
        let entry = inner
            .get_mut(selector)
            .ok_or(ClientError::SubscriptionNotFound)?;

        let before = entry.len();
        entry.retain(|listener| listener.id != id);
        if entry.len() == before {
            return Err(ClientError::SubscriptionNotFound);
        }

        if entry.is_empty() {
            inner.remove(selector);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Every listener slot whose selector matches `key`
    ///
    /// Exact mode looks the key up directly; prefix mode takes the union of
    /// all registered selectors that prefix `key` — overlapping prefixes
    /// all fire, this is fan-out rather than first-match.
    pub fn matching_listeners(&self, key: &str) -> Vec<UnboundedSender<KeyValuePair>> {
        let inner = self.inner.lock();
        match self.mode {
            SelectorMatch::Exact => inner
                .get(key)
                .map(|listeners| listeners.iter().map(|l| l.sender.clone()).collect())
                .unwrap_or_default(),
            SelectorMatch::Prefix => inner
                .iter()
                .filter(|(selector, _)| key.starts_with(selector.as_str()))
                .flat_map(|(_, listeners)| listeners.iter().map(|l| l.sender.clone()))
                .collect(),
        }
    }

    /// Drop every listener slot
    ///
    /// Outstanding receivers observe the disconnection on their next read;
    /// used by the dispatch loop's connection-loss broadcast.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Number of selectors with at least one listener
    pub fn selector_count(&self) -> usize {
        self.inner.lock().len()
    }
}
