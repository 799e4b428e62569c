//! Reverse lookup from connection to the one seat it holds.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

use super::key::SeatKey;

/// The seat a connection holds, pinned to the hold that put it there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedHold {
    pub key: SeatKey,
    pub hold_id: u64,
}

#[derive(Debug, Default)]
struct SlotState {
    hold: Option<IndexedHold>,
    /// Set once the connection is forgotten. Lockers that find it retry.
    removed: bool,
}

type Slot = Arc<Mutex<SlotState>>;

/// Shared map of connection ID to its currently held seat.
///
/// Uses `DashMap` for shard-level concurrency and a `parking_lot::Mutex` per
/// connection. The per-connection mutex doubles as the lock that serializes
/// facade operations issued by the same connection.
///
/// This is advisory: the hold table is the source of truth, and callers
/// reconcile against it before trusting an entry.
#[derive(Clone, Default)]
pub struct ConnectionIndex {
    slots: Arc<DashMap<String, Slot>>,
}

/// A locked view of one connection's entry.
///
/// Holding this blocks every other index operation on the same connection.
pub struct ConnectionSlot {
    connection_id: String,
    slot: Slot,
    guard: ArcMutexGuard<RawMutex, SlotState>,
}

impl ConnectionSlot {
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn current(&self) -> Option<IndexedHold> {
        self.guard.hold
    }

    pub fn current_seat(&self) -> Option<SeatKey> {
        self.guard.hold.map(|held| held.key)
    }

    /// Overwrites any previous entry. Release the old hold first.
    pub fn record_hold(&mut self, key: SeatKey, hold_id: u64) {
        self.guard.hold = Some(IndexedHold { key, hold_id });
    }

    pub fn clear(&mut self) -> Option<IndexedHold> {
        self.guard.hold.take()
    }
}

impl ConnectionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the connection's entry, creating an empty one if needed.
    pub fn lock(&self, connection_id: &str) -> ConnectionSlot {
        loop {
            let slot = Arc::clone(&self.slots.entry(connection_id.to_string()).or_default());
            let guard = slot.lock_arc();
            if !guard.removed {
                return ConnectionSlot {
                    connection_id: connection_id.to_string(),
                    slot,
                    guard,
                };
            }
        }
    }

    /// Lock the connection's entry only if it is already tracked.
    pub fn lock_existing(&self, connection_id: &str) -> Option<ConnectionSlot> {
        loop {
            let slot = self.slot(connection_id)?;
            let guard = slot.lock_arc();
            if !guard.removed {
                return Some(ConnectionSlot {
                    connection_id: connection_id.to_string(),
                    slot,
                    guard,
                });
            }
        }
    }

    // Clone the Arc out so the shard guard is released before the slot mutex
    // is taken.
    fn slot(&self, connection_id: &str) -> Option<Slot> {
        self.slots.get(connection_id).map(|slot| Arc::clone(&slot))
    }

    pub fn record_hold(&self, connection_id: &str, key: SeatKey, hold_id: u64) {
        self.lock(connection_id).record_hold(key, hold_id);
    }

    pub fn current(&self, connection_id: &str) -> Option<IndexedHold> {
        self.slot(connection_id)?.lock().hold
    }

    pub fn current_seat(&self, connection_id: &str) -> Option<SeatKey> {
        self.current(connection_id).map(|held| held.key)
    }

    pub fn clear(&self, connection_id: &str) {
        if let Some(slot) = self.slot(connection_id) {
            slot.lock().hold = None;
        }
    }

    /// Clear the entry only if it still points at hold `hold_id`.
    ///
    /// A re-acquire of the same seat gets a new id, so a late expiry never
    /// wipes the newer entry.
    pub fn clear_if(&self, connection_id: &str, hold_id: u64) -> bool {
        let Some(slot) = self.slot(connection_id) else {
            return false;
        };
        let mut state = slot.lock();
        if state.hold.is_some_and(|held| held.hold_id == hold_id) {
            state.hold = None;
            true
        } else {
            false
        }
    }

    /// Forget a locked connection. Anyone already waiting on its slot will
    /// start over with a fresh entry.
    pub fn remove_locked(&self, mut slot: ConnectionSlot) {
        slot.guard.hold = None;
        slot.guard.removed = true;
        self.slots
            .remove_if(&slot.connection_id, |_, current| Arc::ptr_eq(current, &slot.slot));
    }

    /// Forget the connection entirely (disconnect).
    pub fn remove(&self, connection_id: &str) {
        if let Some(slot) = self.lock_existing(connection_id) {
            self.remove_locked(slot);
        }
    }

    /// Number of tracked connections.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
