//! Correlation table: in-flight action ids mapped to their waiting caller.
//!
//! Each registration owns a single-assignment cell (`oneshot`). The listener
//! resolves it with the first response carrying the same `actionid`; the
//! waiter removes it again on timeout. Registrations are tagged with a
//! sequence number so that a timed-out waiter never removes a newer
//! registration made under the same id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;

use crate::protocol::Block;

struct Entry {
    seq: u64,
    tx: oneshot::Sender<Block>,
}

/// Receiving side of a registration.
#[derive(Debug)]
pub struct PendingReply {
    pub action_id: String,
    seq: u64,
    rx: oneshot::Receiver<Block>,
}

impl PendingReply {
    /// Wait for the response. `None` if the registration was dropped without
    /// being resolved (replaced by a newer one under the same id).
    pub async fn recv(&mut self) -> Option<Block> {
        (&mut self.rx).await.ok()
    }
}

/// Map of action id to waiting caller.
#[derive(Default)]
pub struct CorrelationTable {
    entries: Mutex<HashMap<String, Entry>>,
    next_seq: AtomicU64,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a waiter for `action_id`.
    ///
    /// An existing registration under the same id is replaced; its waiter
    /// resolves as unanswered.
    pub fn register(&self, action_id: &str) -> PendingReply {
        let (tx, rx) = oneshot::channel();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        let previous = self
            .entries()
            .insert(action_id.to_string(), Entry { seq, tx });
        if previous.is_some() {
            tracing::warn!(action_id, "replacing pending correlation with the same id");
        }

        PendingReply {
            action_id: action_id.to_string(),
            seq,
            rx,
        }
    }

    /// Deliver a response to the waiter registered under `action_id`.
    ///
    /// Returns `true` if a waiter was registered. The entry is removed, so a
    /// second response with the same id finds nothing.
    pub fn resolve(&self, action_id: &str, block: Block) -> bool {
        let entry = self.entries().remove(action_id);
        match entry {
            Some(entry) => {
                if entry.tx.send(block).is_err() {
                    tracing::debug!(action_id, "waiter gone before its response arrived");
                }
                true
            }
            None => false,
        }
    }

    /// Remove a registration if it is still the one described by `pending`.
    pub fn deregister(&self, pending: &PendingReply) {
        let mut entries = self.entries();
        if entries
            .get(&pending.action_id)
            .is_some_and(|e| e.seq == pending.seq)
        {
            entries.remove(&pending.action_id);
        }
    }

    pub fn contains(&self, action_id: &str) -> bool {
        self.entries().contains_key(action_id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
