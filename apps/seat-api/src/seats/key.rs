//! Seat and group identity.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Identity of one physical seat for one date + time slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct SeatKey {
    pub seat_id: i32,
    pub date: NaiveDate,
    pub slot_id: i32,
}

impl SeatKey {
    pub fn new(seat_id: i32, date: NaiveDate, slot_id: i32) -> Self {
        Self {
            seat_id,
            date,
            slot_id,
        }
    }

    /// The group whose members are notified about this seat.
    pub fn group(&self) -> GroupKey {
        GroupKey::new(self.date, self.slot_id)
    }
}

impl fmt::Display for SeatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.group(), self.seat_id)
    }
}

/// A date + time slot. Connections join groups to receive seat events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct GroupKey {
    pub date: NaiveDate,
    pub slot_id: i32,
}

impl GroupKey {
    pub fn new(date: NaiveDate, slot_id: i32) -> Self {
        Self { date, slot_id }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.date, self.slot_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn seat_key_equality_is_structural() {
        let a = SeatKey::new(5, date(2024, 1, 1), 2);
        let b = SeatKey::new(5, date(2024, 1, 1), 2);
        let c = SeatKey::new(5, date(2024, 1, 2), 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn group_key_display() {
        let key = SeatKey::new(5, date(2024, 1, 1), 2);
        assert_eq!(key.group().to_string(), "2024-01-01:2");
        assert_eq!(key.to_string(), "2024-01-01:2#5");
    }

    #[test]
    fn seats_in_same_slot_share_a_group() {
        let a = SeatKey::new(5, date(2024, 1, 1), 2);
        let b = SeatKey::new(6, date(2024, 1, 1), 2);
        assert_eq!(a.group(), b.group());
    }
}
