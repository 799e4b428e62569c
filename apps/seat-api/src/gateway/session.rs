//! Per-connection gateway session state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::seats::GroupKey;

/// State for a single WebSocket connection.
pub struct GatewaySession {
    /// Unique connection identifier (`conn_` prefixed ULID).
    pub connection_id: String,
    /// Date + slot groups this connection receives seat events for.
    groups: RwLock<HashSet<GroupKey>>,
    /// Monotonically increasing sequence number for dispatch events.
    seq: AtomicU64,
}

impl GatewaySession {
    pub fn new(connection_id: String) -> Self {
        Self {
            connection_id,
            groups: RwLock::new(HashSet::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Get the next sequence number for a dispatch event.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns false if the group was already joined.
    pub fn join(&self, group: GroupKey) -> bool {
        self.groups.write().insert(group)
    }

    /// Returns false if the group was not joined.
    pub fn leave(&self, group: &GroupKey) -> bool {
        self.groups.write().remove(group)
    }

    /// Check whether this session should receive events for a given group.
    pub fn is_subscribed(&self, group: &GroupKey) -> bool {
        self.groups.read().contains(group)
    }
}
