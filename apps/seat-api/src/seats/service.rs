//! Facade over the hold table and connection index.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use super::index::{ConnectionIndex, ConnectionSlot, IndexedHold};
use super::key::{GroupKey, SeatKey};
use super::table::{Acquire, HoldExpiry, HoldListener, SeatHold, SeatHoldTable};

/// Result of [`SeatCacheService::try_select_seat`].
#[derive(Debug)]
pub enum SelectionOutcome {
    /// A new hold was created.
    Acquired {
        hold: SeatHold,
        /// Subscribe before doing anything else; resolves when the hold ends.
        expiry: HoldExpiry,
        /// The connection's previous seat, released by this switch.
        released: Option<SeatKey>,
    },
    /// The connection already held this seat. No new timer was armed.
    AlreadyHeld,
    /// Another connection holds the seat. Nothing changed.
    Taken,
}

impl SelectionOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Taken)
    }
}

/// Read-only projection of a connection's held seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct CurrentSeatView {
    pub seat_id: i32,
    pub date: NaiveDate,
    pub slot_id: i32,
}

impl From<SeatKey> for CurrentSeatView {
    fn from(key: SeatKey) -> Self {
        Self {
            seat_id: key.seat_id,
            date: key.date,
            slot_id: key.slot_id,
        }
    }
}

/// Process-wide seat-hold cache. Cloneable; store in `AppState`.
///
/// Every operation is one transaction across both maps. Lock order is the
/// connection slot first, then the hold-table shard; the expiry hook only
/// touches the index after the shard lock is gone.
#[derive(Clone)]
pub struct SeatCacheService {
    holds: SeatHoldTable,
    connections: ConnectionIndex,
    ttl: Duration,
}

impl SeatCacheService {
    /// Panics if `ttl` is zero.
    pub fn new(ttl: Duration) -> Self {
        Self::build(ttl, None)
    }

    /// Like [`new`](Self::new), reporting every hold transition to `listener`
    /// in per-seat order.
    pub fn with_listener(ttl: Duration, listener: Arc<dyn HoldListener>) -> Self {
        Self::build(ttl, Some(listener))
    }

    fn build(ttl: Duration, listener: Option<Arc<dyn HoldListener>>) -> Self {
        assert!(!ttl.is_zero(), "seat hold TTL must be greater than zero");

        let connections = ConnectionIndex::new();
        let index = connections.clone();
        let holds = SeatHoldTable::with_hooks(
            move |hold: &SeatHold| {
                index.clear_if(&hold.owner, hold.hold_id);
            },
            listener,
        );

        Self {
            holds,
            connections,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Try to hold a seat for `connection_id`.
    ///
    /// A connection holds at most one seat: on success any other seat it held
    /// is released and reported back as `released`.
    /// If the new seat is taken the current one is kept.
    pub fn try_select_seat(
        &self,
        seat_id: i32,
        date: NaiveDate,
        slot_id: i32,
        connection_id: &str,
    ) -> SelectionOutcome {
        let key = SeatKey::new(seat_id, date, slot_id);
        let mut slot = self.connections.lock(connection_id);
        self.select_locked(&mut slot, key)
    }

    fn select_locked(&self, slot: &mut ConnectionSlot, key: SeatKey) -> SelectionOutcome {
        let connection_id = slot.connection_id().to_string();
        let current = self.reconcile(slot).map(|held| held.key);

        if current == Some(key) {
            return SelectionOutcome::AlreadyHeld;
        }

        match self.holds.try_acquire(key, &connection_id, self.ttl) {
            Acquire::Inserted { hold, expiry } => {
                let released = current.filter(|previous| self.holds.release(previous, &connection_id));
                slot.record_hold(key, hold.hold_id);

                tracing::info!(
                    seat = %key,
                    connection_id = %connection_id,
                    released = ?released.map(|k| k.to_string()),
                    "seat held"
                );

                SelectionOutcome::Acquired {
                    hold,
                    expiry,
                    released,
                }
            }
            Acquire::AlreadyOwned { hold_id } => {
                // Table says we own it but the index lost track.
                if let Some(previous) = current {
                    self.holds.release(&previous, &connection_id);
                }
                slot.record_hold(key, hold_id);
                SelectionOutcome::AlreadyHeld
            }
            Acquire::Taken => {
                tracing::debug!(seat = %key, connection_id = %connection_id, "seat already held");
                SelectionOutcome::Taken
            }
        }
    }

    /// Release a seat held by `connection_id`.
    ///
    /// Returns false if the connection did not hold it, which includes losing
    /// a race against expiry.
    pub fn release_seat(&self, seat_id: i32, date: NaiveDate, slot_id: i32, connection_id: &str) -> bool {
        let key = SeatKey::new(seat_id, date, slot_id);
        let slot = self.connections.lock_existing(connection_id);

        if !self.holds.release(&key, connection_id) {
            return false;
        }
        if let Some(mut slot) = slot {
            if slot.current_seat() == Some(key) {
                slot.clear();
            }
        }

        tracing::info!(seat = %key, connection_id, "seat released");
        true
    }

    pub fn get_user_current_seat(&self, connection_id: &str) -> Option<CurrentSeatView> {
        let mut slot = self.connections.lock_existing(connection_id)?;
        self.reconcile(&mut slot).map(|held| held.key.into())
    }

    /// Release whatever `connection_id` holds. False if it held nothing.
    pub fn release_user_current_seat(&self, connection_id: &str) -> bool {
        self.connections
            .lock_existing(connection_id)
            .and_then(|mut slot| self.release_current(&mut slot))
            .is_some()
    }

    /// Release the connection's seat and forget the connection.
    ///
    /// Returns the released seat so the caller can log or report it.
    pub fn disconnect(&self, connection_id: &str) -> Option<SeatKey> {
        let mut slot = self.connections.lock_existing(connection_id)?;
        let released = self.release_current(&mut slot);
        self.connections.remove_locked(slot);
        released
    }

    fn release_current(&self, slot: &mut ConnectionSlot) -> Option<SeatKey> {
        let held = slot.clear()?;
        let released = self.holds.release(&held.key, slot.connection_id());
        if released {
            tracing::info!(seat = %held.key, connection_id = slot.connection_id(), "current seat released");
        }
        released.then_some(held.key)
    }

    /// Live holds for one date + slot.
    pub fn holds_in_group(&self, group: &GroupKey) -> Vec<SeatHold> {
        self.holds.holds_in_group(group)
    }

    /// Drop an index entry the table no longer backs.
    fn reconcile(&self, slot: &mut ConnectionSlot) -> Option<IndexedHold> {
        let current = slot.current()?;
        if self.holds.is_current(&current.key, current.hold_id) {
            return Some(current);
        }

        tracing::debug!(
            seat = %current.key,
            connection_id = slot.connection_id(),
            "clearing stale connection index entry"
        );
        slot.clear();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seats::table::HoldEnd;
    use tokio::time;

    const TTL: Duration = Duration::from_secs(60);

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn acquired(outcome: SelectionOutcome) -> (HoldExpiry, Option<SeatKey>) {
        match outcome {
            SelectionOutcome::Acquired { expiry, released, .. } => (expiry, released),
            other => panic!("expected Acquired, got {other:?}"),
        }
    }

    #[test]
    #[should_panic(expected = "greater than zero")]
    fn zero_ttl_is_rejected() {
        SeatCacheService::new(Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn select_records_current_seat() {
        let service = SeatCacheService::new(TTL);
        let (_, released) = acquired(service.try_select_seat(5, day(), 2, "conn_a"));
        assert!(released.is_none());

        let view = service.get_user_current_seat("conn_a").unwrap();
        assert_eq!(view, CurrentSeatView { seat_id: 5, date: day(), slot_id: 2 });
        assert!(service.get_user_current_seat("conn_b").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn contended_select_fails_without_side_effects() {
        let service = SeatCacheService::new(TTL);
        acquired(service.try_select_seat(5, day(), 2, "conn_a"));
        acquired(service.try_select_seat(7, day(), 2, "conn_b"));

        let outcome = service.try_select_seat(5, day(), 2, "conn_b");
        assert!(matches!(outcome, SelectionOutcome::Taken));
        assert!(!outcome.is_success());

        // conn_b keeps seat 7, conn_a keeps seat 5.
        assert_eq!(service.get_user_current_seat("conn_b").unwrap().seat_id, 7);
        assert_eq!(service.get_user_current_seat("conn_a").unwrap().seat_id, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn reselect_is_idempotent_with_single_expiry() {
        let service = SeatCacheService::new(TTL);
        let (expiry, _) = acquired(service.try_select_seat(5, day(), 2, "conn_a"));

        let again = service.try_select_seat(5, day(), 2, "conn_a");
        assert!(matches!(again, SelectionOutcome::AlreadyHeld));
        assert!(again.is_success());
        assert_eq!(service.holds.len(), 1);

        assert_eq!(expiry.ended().await, HoldEnd::Expired);
        time::sleep(TTL * 2).await;
        assert!(service.holds.is_empty());
        assert!(service.get_user_current_seat("conn_a").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn switching_seats_releases_previous() {
        let service = SeatCacheService::new(TTL);
        let (first, _) = acquired(service.try_select_seat(5, day(), 2, "conn_a"));
        let (_, released) = acquired(service.try_select_seat(6, day(), 2, "conn_a"));

        assert_eq!(released, Some(SeatKey::new(5, day(), 2)));
        assert_eq!(first.ended().await, HoldEnd::Released);
        assert_eq!(service.get_user_current_seat("conn_a").unwrap().seat_id, 6);
        assert_eq!(service.holds.len(), 1);
        assert_eq!(service.connections.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connection_never_records_more_than_one_seat() {
        let service = SeatCacheService::new(TTL);
        for seat_id in 1..=10 {
            acquired(service.try_select_seat(seat_id, day(), 2, "conn_a"));
        }

        assert_eq!(service.holds.len(), 1);
        assert_eq!(service.connections.current_seat("conn_a"), Some(SeatKey::new(10, day(), 2)));
    }

    #[tokio::test(start_paused = true)]
    async fn release_then_reacquire_by_other_owner() {
        let service = SeatCacheService::new(TTL);
        acquired(service.try_select_seat(5, day(), 2, "conn_a"));

        assert!(!service.release_seat(5, day(), 2, "conn_b"));
        assert!(service.release_seat(5, day(), 2, "conn_a"));
        assert!(service.get_user_current_seat("conn_a").is_none());

        acquired(service.try_select_seat(5, day(), 2, "conn_b"));
        assert!(!service.release_seat(5, day(), 2, "conn_a"));
    }

    #[tokio::test(start_paused = true)]
    async fn release_user_current_seat_reports_whether_anything_was_held() {
        let service = SeatCacheService::new(TTL);
        assert!(!service.release_user_current_seat("conn_a"));

        acquired(service.try_select_seat(5, day(), 2, "conn_a"));
        assert!(service.release_user_current_seat("conn_a"));
        assert!(!service.release_user_current_seat("conn_a"));
        assert!(service.holds.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_releases_and_forgets() {
        let service = SeatCacheService::new(TTL);
        let (expiry, _) = acquired(service.try_select_seat(6, day(), 2, "conn_a"));

        assert_eq!(service.disconnect("conn_a"), Some(SeatKey::new(6, day(), 2)));
        assert_eq!(expiry.ended().await, HoldEnd::Released);
        assert!(service.connections.is_empty());
        assert!(service.get_user_current_seat("conn_a").is_none());
        assert_eq!(service.disconnect("conn_a"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_index_entry_is_healed_on_read() {
        let service = SeatCacheService::new(TTL);
        acquired(service.try_select_seat(5, day(), 2, "conn_a"));

        // Point the index at a seat the table does not back.
        service.connections.record_hold("conn_a", SeatKey::new(9, day(), 2), u64::MAX);
        assert!(service.get_user_current_seat("conn_a").is_none());
        assert!(service.connections.current_seat("conn_a").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn lost_index_entry_is_restored_on_reselect() {
        let service = SeatCacheService::new(TTL);
        acquired(service.try_select_seat(5, day(), 2, "conn_a"));
        service.connections.clear("conn_a");

        assert!(matches!(
            service.try_select_seat(5, day(), 2, "conn_a"),
            SelectionOutcome::AlreadyHeld
        ));
        assert_eq!(service.get_user_current_seat("conn_a").unwrap().seat_id, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn owned_seat_missing_from_index_replaces_stale_entry() {
        let service = SeatCacheService::new(TTL);
        let seat5 = SeatKey::new(5, day(), 2);
        let seat9 = SeatKey::new(9, day(), 2);
        acquired(service.try_select_seat(5, day(), 2, "conn_a"));
        // The table also has conn_a on seat 9 without the index knowing.
        assert!(matches!(
            service.holds.try_acquire(seat9, "conn_a", TTL),
            Acquire::Inserted { .. }
        ));

        assert!(matches!(
            service.try_select_seat(9, day(), 2, "conn_a"),
            SelectionOutcome::AlreadyHeld
        ));
        assert!(service.holds.lookup(&seat5).is_none());
        assert_eq!(service.holds.len(), 1);
        assert_eq!(service.get_user_current_seat("conn_a").unwrap().seat_id, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_then_reselect_then_switch_keeps_one_seat() {
        let service = SeatCacheService::new(TTL);
        let seat5 = SeatKey::new(5, day(), 2);
        let (expiry, _) = acquired(service.try_select_seat(5, day(), 2, "conn_a"));
        assert_eq!(expiry.ended().await, HoldEnd::Expired);

        let (again, _) = acquired(service.try_select_seat(5, day(), 2, "conn_a"));
        let (_, released) = acquired(service.try_select_seat(6, day(), 2, "conn_a"));
        assert_eq!(released, Some(seat5));
        assert_eq!(again.ended().await, HoldEnd::Released);

        assert_eq!(service.holds.len(), 1);
        let current = service.connections.current("conn_a").unwrap();
        assert_eq!(current.key, SeatKey::new(6, day(), 2));
        assert!(service.holds.is_current(&current.key, current.hold_id));
    }

    #[tokio::test]
    async fn late_expiry_hook_keeps_reacquired_entry() {
        let service = SeatCacheService::new(TTL);
        let seat5 = SeatKey::new(5, day(), 2);
        acquired(service.try_select_seat(5, day(), 2, "conn_a"));
        let first = service.connections.current("conn_a").unwrap();

        // The timer fires while the connection is mid-operation: the hold is
        // gone but the index hook is stuck behind the slot lock.
        let mut slot = service.connections.lock("conn_a");
        let timer = service.clone();
        let expiring = std::thread::spawn(move || timer.holds.expire(&seat5, first.hold_id));
        for _ in 0..1000 {
            if service.holds.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(service.holds.is_empty());

        // Same connection takes the same seat again before the hook runs.
        let (reacquired, released) = acquired(service.select_locked(&mut slot, seat5));
        assert!(released.is_none());
        drop(slot);
        assert!(expiring.join().unwrap().is_some());

        let current = service.connections.current("conn_a").unwrap();
        assert_eq!(current.key, seat5);
        assert_ne!(current.hold_id, first.hold_id);

        // A switch now releases the re-acquired seat, leaving one hold.
        let (_, released) = acquired(service.try_select_seat(6, day(), 2, "conn_a"));
        assert_eq!(released, Some(seat5));
        assert_eq!(reacquired.ended().await, HoldEnd::Released);
        assert_eq!(service.holds.len(), 1);

        assert_eq!(service.disconnect("conn_a"), Some(SeatKey::new(6, day(), 2)));
        assert!(service.holds.is_empty());
        assert!(service.connections.is_empty());
    }

    #[tokio::test]
    async fn short_ttl_expires_on_its_own() {
        let service = SeatCacheService::new(Duration::from_millis(50));
        let (expiry, _) = acquired(service.try_select_seat(5, day(), 2, "conn_a"));

        let end = time::timeout(Duration::from_secs(2), expiry.ended())
            .await
            .expect("hold did not expire");
        assert_eq!(end, HoldEnd::Expired);
        assert!(service.get_user_current_seat("conn_a").is_none());
        assert!(service.connections.current_seat("conn_a").is_none());
        acquired(service.try_select_seat(5, day(), 2, "conn_b"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_selects_have_one_winner() {
        let service = SeatCacheService::new(TTL);
        let mut tasks = Vec::new();
        for i in 0..64 {
            let service = service.clone();
            tasks.push(tokio::spawn(async move {
                service
                    .try_select_seat(5, day(), 2, &format!("conn_{i}"))
                    .is_success()
            }));
        }

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(service.holds_in_group(&GroupKey::new(day(), 2)).len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn release_racing_expiry_ends_exactly_once() {
        let ttl = Duration::from_millis(20);
        for _ in 0..50 {
            let service = SeatCacheService::new(ttl);
            let (expiry, _) = acquired(service.try_select_seat(5, day(), 2, "conn_a"));

            let releaser = service.clone();
            let release = tokio::spawn(async move {
                time::sleep(ttl).await;
                releaser.release_seat(5, day(), 2, "conn_a")
            });

            let end = expiry.ended().await;
            let released = release.await.unwrap();

            // Exactly one side observes the hold ending.
            assert_eq!(released, end == HoldEnd::Released);
            assert!(released || end == HoldEnd::Expired);
            assert!(service.holds_in_group(&GroupKey::new(day(), 2)).is_empty());
            assert!(service.get_user_current_seat("conn_a").is_none());
        }
    }
}
