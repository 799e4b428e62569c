//! Broadcast hub for dispatching seat events to connected sessions.
//!
//! Uses a single `tokio::sync::broadcast` channel. Each connected session
//! subscribes and filters events locally by the groups it has joined.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::seats::GroupKey;

/// Capacity of the broadcast channel. Slow receivers that fall behind will
/// skip messages (RecvError::Lagged).
const BROADCAST_CAPACITY: usize = 4096;

/// A payload broadcast to every session in a group.
#[derive(Debug, Clone)]
pub struct BroadcastPayload {
    /// The date + slot group this event belongs to.
    pub group: GroupKey,
    /// The dispatch event name (e.g. "SEAT_RELEASED").
    pub event_name: String,
    /// Serialized event data.
    pub data: Value,
}

/// The global broadcast hub. Cloneable; store in AppState.
#[derive(Clone)]
pub struct GatewayBroadcast {
    sender: broadcast::Sender<Arc<BroadcastPayload>>,
}

impl GatewayBroadcast {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    /// Subscribe to the broadcast channel. Each gateway session should call
    /// this once to get its own receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BroadcastPayload>> {
        self.sender.subscribe()
    }

    /// Dispatch an event to all sessions in `payload.group`.
    pub fn dispatch(&self, payload: BroadcastPayload) {
        let group = payload.group;
        let event_name = payload.event_name.clone();
        if self.sender.send(Arc::new(payload)).is_err() {
            tracing::trace!(%group, %event_name, "no gateway subscribers for broadcast");
        }
    }
}

impl Default for GatewayBroadcast {
    fn default() -> Self {
        Self::new()
    }
}
