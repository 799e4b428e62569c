//! Seat hold table with per-hold expiry timers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant};

use super::key::{GroupKey, SeatKey};

/// An active, unconfirmed claim on a seat.
#[derive(Debug, Clone, Serialize)]
pub struct SeatHold {
    pub key: SeatKey,
    /// Connection ID of the holder.
    pub owner: String,
    pub held_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Process-unique identity of this hold; a re-acquired seat gets a new one.
    #[serde(skip)]
    pub hold_id: u64,
    #[serde(skip)]
    deadline: Instant,
}

impl SeatHold {
    /// True once the TTL has elapsed, even if the timer has not run yet.
    pub fn is_overdue(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

/// How a hold ended, as seen by its [`HoldExpiry`] subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldEnd {
    /// The TTL elapsed and the timer removed the hold.
    Expired,
    /// Released explicitly (or by disconnect) before the timer fired.
    Released,
    /// The deadline had passed and another connection took the seat first.
    Superseded,
}

/// Expiry subscription handed out when a hold is created.
///
/// Resolves exactly once. Only [`HoldEnd::Expired`] means nobody else has
/// announced the seat as free.
#[derive(Debug)]
pub struct HoldExpiry {
    key: SeatKey,
    rx: oneshot::Receiver<HoldEnd>,
}

impl HoldExpiry {
    pub fn key(&self) -> SeatKey {
        self.key
    }

    /// Wait until the hold ends. A dropped table counts as a release.
    pub async fn ended(self) -> HoldEnd {
        self.rx.await.unwrap_or(HoldEnd::Released)
    }
}

/// Result of [`SeatHoldTable::try_acquire`].
#[derive(Debug)]
pub enum Acquire {
    /// A new hold and timer were created.
    Inserted { hold: SeatHold, expiry: HoldExpiry },
    /// The owner already holds this seat; nothing changed.
    AlreadyOwned { hold_id: u64 },
    /// Another owner holds the seat.
    Taken,
}

/// Observer of hold transitions.
///
/// Called while the seat's shard lock is held, so everything reported for
/// one seat arrives in the order it happened. Implementations must not call
/// back into the table.
pub trait HoldListener: Send + Sync {
    fn hold_started(&self, hold: &SeatHold);
    fn hold_ended(&self, hold: &SeatHold, end: HoldEnd);
}

type ExpiryHook = Box<dyn Fn(&SeatHold) + Send + Sync>;

/// A hold together with its timer and its subscriber channel.
struct TimedEntry {
    hold: SeatHold,
    timer: AbortHandle,
    ended: Option<oneshot::Sender<HoldEnd>>,
}

impl TimedEntry {
    /// Consume a removed entry and notify its subscriber.
    fn finish(mut self, end: HoldEnd) -> SeatHold {
        if end != HoldEnd::Expired {
            self.timer.abort();
        }
        if let Some(tx) = self.ended.take() {
            // Receiver may already be gone (caller did not subscribe).
            let _ = tx.send(end);
        }
        self.hold
    }
}

struct TableInner {
    holds: DashMap<SeatKey, TimedEntry>,
    next_hold_id: AtomicU64,
    on_expire: Option<ExpiryHook>,
    listener: Option<Arc<dyn HoldListener>>,
}

impl TableInner {
    fn started(&self, hold: &SeatHold) {
        if let Some(listener) = &self.listener {
            listener.hold_started(hold);
        }
    }

    fn ended(&self, hold: &SeatHold, end: HoldEnd) {
        if let Some(listener) = &self.listener {
            listener.hold_ended(hold, end);
        }
    }
}

/// Concurrent map from seat to its current hold.
///
/// All mutation for one key happens under that key's `DashMap` shard lock, so
/// acquire, release and expire on the same seat are linearizable while other
/// seats proceed in parallel.
#[derive(Clone)]
pub struct SeatHoldTable {
    inner: Arc<TableInner>,
}

impl SeatHoldTable {
    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// Create a table that calls `hook` after a hold is removed by its timer.
    ///
    /// The hook runs after the shard lock is released.
    pub fn with_expiry_hook(hook: impl Fn(&SeatHold) + Send + Sync + 'static) -> Self {
        Self::build(Some(Box::new(hook)), None)
    }

    /// Like [`with_expiry_hook`](Self::with_expiry_hook), additionally
    /// reporting every transition to `listener`.
    pub fn with_hooks(
        hook: impl Fn(&SeatHold) + Send + Sync + 'static,
        listener: Option<Arc<dyn HoldListener>>,
    ) -> Self {
        Self::build(Some(Box::new(hook)), listener)
    }

    fn build(on_expire: Option<ExpiryHook>, listener: Option<Arc<dyn HoldListener>>) -> Self {
        Self {
            inner: Arc::new(TableInner {
                holds: DashMap::new(),
                next_hold_id: AtomicU64::new(1),
                on_expire,
                listener,
            }),
        }
    }

    /// Insert a hold for `key` unless a live hold by someone else exists.
    ///
    /// Must be called inside a tokio runtime: the expiry timer is a spawned task.
    pub fn try_acquire(&self, key: SeatKey, owner: &str, ttl: Duration) -> Acquire {
        let now = Instant::now();

        let (superseded, hold, expiry) = match self.inner.holds.entry(key) {
            Entry::Occupied(mut occupied) => {
                let current = &occupied.get().hold;
                if !current.is_overdue(now) {
                    return if current.owner == owner {
                        Acquire::AlreadyOwned {
                            hold_id: current.hold_id,
                        }
                    } else {
                        Acquire::Taken
                    };
                }
                let (entry, expiry) = self.new_entry(key, owner, ttl, now);
                let hold = entry.hold.clone();
                let previous = occupied.insert(entry);
                self.inner.ended(&previous.hold, HoldEnd::Superseded);
                self.inner.started(&hold);
                (Some(previous), hold, expiry)
            }
            Entry::Vacant(vacant) => {
                let (entry, expiry) = self.new_entry(key, owner, ttl, now);
                let hold = entry.hold.clone();
                let _inserted = vacant.insert(entry);
                self.inner.started(&hold);
                (None, hold, expiry)
            }
        };

        if let Some(previous) = superseded {
            let previous = previous.finish(HoldEnd::Superseded);
            tracing::debug!(
                seat = %key,
                previous_owner = %previous.owner,
                owner,
                "overdue seat hold superseded before its timer ran"
            );
        }

        Acquire::Inserted { hold, expiry }
    }

    fn new_entry(&self, key: SeatKey, owner: &str, ttl: Duration, now: Instant) -> (TimedEntry, HoldExpiry) {
        let hold_id = self.inner.next_hold_id.fetch_add(1, Ordering::Relaxed);
        let deadline = now + ttl;
        let held_at = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| held_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let (tx, rx) = oneshot::channel();
        let timer = self.arm_timer(key, hold_id, deadline);

        let entry = TimedEntry {
            hold: SeatHold {
                key,
                owner: owner.to_string(),
                held_at,
                expires_at,
                hold_id,
                deadline,
            },
            timer,
            ended: Some(tx),
        };
        (entry, HoldExpiry { key, rx })
    }

    fn arm_timer(&self, key: SeatKey, hold_id: u64, deadline: Instant) -> AbortHandle {
        let table: Weak<TableInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            time::sleep_until(deadline).await;
            if let Some(inner) = table.upgrade() {
                SeatHoldTable { inner }.expire(&key, hold_id);
            }
        })
        .abort_handle()
    }

    /// Remove `owner`'s hold on `key` and cancel its timer.
    ///
    /// Returns false if the seat is free or held by someone else.
    pub fn release(&self, key: &SeatKey, owner: &str) -> bool {
        let entry = match self.inner.holds.entry(*key) {
            Entry::Occupied(occupied) if occupied.get().hold.owner == owner => {
                self.inner.ended(&occupied.get().hold, HoldEnd::Released);
                occupied.remove()
            }
            _ => return false,
        };
        entry.finish(HoldEnd::Released);
        true
    }

    /// Timer callback: remove the hold only if it is still the one identified
    /// by `hold_id`. Returns `None` when a release or re-acquire got there first.
    pub fn expire(&self, key: &SeatKey, hold_id: u64) -> Option<SeatHold> {
        let entry = match self.inner.holds.entry(*key) {
            Entry::Occupied(occupied) if occupied.get().hold.hold_id == hold_id => {
                self.inner.ended(&occupied.get().hold, HoldEnd::Expired);
                occupied.remove()
            }
            _ => return None,
        };

        if let Some(hook) = &self.inner.on_expire {
            hook(&entry.hold);
        }
        let hold = entry.finish(HoldEnd::Expired);

        tracing::info!(seat = %hold.key, owner = %hold.owner, "seat hold expired");
        Some(hold)
    }

    /// Current live hold on `key`, if any.
    pub fn lookup(&self, key: &SeatKey) -> Option<SeatHold> {
        let entry = self.inner.holds.get(key)?;
        if entry.hold.is_overdue(Instant::now()) {
            return None;
        }
        Some(entry.hold.clone())
    }

    pub fn is_held_by(&self, key: &SeatKey, owner: &str) -> bool {
        self.lookup(key).is_some_and(|hold| hold.owner == owner)
    }

    /// True if the live hold on `key` is exactly the one identified by `hold_id`.
    pub fn is_current(&self, key: &SeatKey, hold_id: u64) -> bool {
        self.lookup(key).is_some_and(|hold| hold.hold_id == hold_id)
    }

    /// Live holds for one date + slot, ordered by seat id.
    pub fn holds_in_group(&self, group: &GroupKey) -> Vec<SeatHold> {
        let now = Instant::now();
        let mut holds: Vec<SeatHold> = self
            .inner
            .holds
            .iter()
            .filter(|entry| entry.key().group() == *group && !entry.hold.is_overdue(now))
            .map(|entry| entry.hold.clone())
            .collect();
        holds.sort_by_key(|hold| hold.key.seat_id);
        holds
    }

    /// Number of entries, including overdue ones whose timer has not run yet.
    pub fn len(&self) -> usize {
        self.inner.holds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.holds.is_empty()
    }
}

impl Default for SeatHoldTable {
    fn default() -> Self {
        Self::new()
    }
}
