//! Change versioning: local version counter, stale-change rejection and the
//! pending buffer for edits made while the channel is down.
//!
//! ```text
//! local edit ──► connected? ──yes──► stamp (version + 1) ──► transmit
//!                     │
//!                     no
//!                     ▼
//!              PendingChangeBuffer ──(reconnect)──► drain: stamp each, FIFO
//!
//! remote change (v) ──► v > local? ──yes──► apply, local = v
//!                              │
//!                              no ──► discard (stale or duplicate)
//! ```

use std::collections::VecDeque;

use crate::protocol::ContentChange;

/// One batch of changes with the version it was transmitted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingChange {
    pub version: u64,
    pub changes: Vec<ContentChange>,
}

/// Edits made while disconnected, replayed on reconnection.
///
/// Each entry is one content mutation (the batch raised by a single editor
/// event). Entries carry no version: versions are assigned when drained.
#[derive(Debug, Clone, Default)]
pub struct PendingChangeBuffer {
    queue: VecDeque<Vec<ContentChange>>,
}

impl PendingChangeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a mutation for later replay.
    pub fn enqueue(&mut self, changes: Vec<ContentChange>) {
        self.queue.push_back(changes);
    }

    /// Take every queued mutation in original order, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<Vec<ContentChange>> {
        self.queue.drain(..).collect()
    }

    /// Number of queued mutations.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Total change records across all queued mutations.
    pub fn total_changes(&self) -> usize {
        self.queue.iter().map(Vec::len).sum()
    }
}

/// Per-session version state.
///
/// The counter only moves forward: +1 per local transmission, or up to a
/// newer remote version on acceptance.
#[derive(Debug, Clone, Default)]
pub struct ChangePipeline {
    version: u64,
    pending: PendingChangeBuffer,
}

impl ChangePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current local version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Assign the next version to a batch about to be transmitted.
    pub fn stamp(&mut self, changes: Vec<ContentChange>) -> OutgoingChange {
        self.version += 1;
        OutgoingChange {
            version: self.version,
            changes,
        }
    }

    /// Buffer a batch while the channel is unavailable. The version is untouched.
    pub fn defer(&mut self, changes: Vec<ContentChange>) {
        self.pending.enqueue(changes);
    }

    /// Decide whether a remote change is newer than what is known locally.
    ///
    /// Accepting advances the local version to `remote_version`. `u64::MAX`
    /// is rejected: no local change could be stamped after it.
    pub fn accept_incoming(&mut self, remote_version: u64) -> bool {
        if remote_version == u64::MAX {
            log::warn!("Rejecting remote change with exhausted version {remote_version}");
            return false;
        }
        if remote_version > self.version {
            self.version = remote_version;
            true
        } else {
            false
        }
    }

    /// Empty the pending buffer, stamping each batch in original order.
    pub fn drain_pending(&mut self) -> Vec<OutgoingChange> {
        self.pending
            .drain()
            .into_iter()
            .map(|changes| self.stamp(changes))
            .collect()
    }

    pub fn pending(&self) -> &PendingChangeBuffer {
        &self.pending
    }
}
