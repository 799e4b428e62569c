//! Seat event payloads and their publication to the fanout hub.

use serde_json::{json, Value};

use crate::seats::{GroupKey, HoldEnd, HoldListener, SeatHold, SeatKey};

use super::events::EventName;
use super::fanout::{BroadcastPayload, GatewayBroadcast};

fn hold_json(hold: &SeatHold) -> Value {
    json!({
        "seat_id": hold.key.seat_id,
        "date": hold.key.date,
        "slot_id": hold.key.slot_id,
        "connection_id": hold.owner,
        "expires_at": hold.expires_at,
    })
}

/// `SEAT_SELECTED` for the seat's group.
pub fn seat_selected(hold: &SeatHold) -> BroadcastPayload {
    BroadcastPayload {
        group: hold.key.group(),
        event_name: EventName::SEAT_SELECTED.to_string(),
        data: hold_json(hold),
    }
}

/// `SEAT_RELEASED` for the seat's group.
pub fn seat_released(key: &SeatKey) -> BroadcastPayload {
    BroadcastPayload {
        group: key.group(),
        event_name: EventName::SEAT_RELEASED.to_string(),
        data: json!({
            "seat_id": key.seat_id,
            "date": key.date,
            "slot_id": key.slot_id,
        }),
    }
}

/// `SEAT_ALREADY_SELECTED` data, sent to the requesting connection only.
pub fn seat_already_selected(seat_id: i32) -> Value {
    json!({ "seat_id": seat_id })
}

/// `GROUP_JOINED` data: the group plus every seat currently held in it.
pub fn group_snapshot(group: &GroupKey, holds: &[SeatHold]) -> Value {
    json!({
        "date": group.date,
        "slot_id": group.slot_id,
        "holds": holds.iter().map(hold_json).collect::<Vec<_>>(),
    })
}

/// Seat events go out from inside the seat's critical section, so a group
/// always sees a seat's release before the next selection of it.
impl HoldListener for GatewayBroadcast {
    fn hold_started(&self, hold: &SeatHold) {
        self.dispatch(seat_selected(hold));
    }

    fn hold_ended(&self, hold: &SeatHold, end: HoldEnd) {
        tracing::trace!(seat = %hold.key, owner = %hold.owner, ?end, "seat hold ended");
        self.dispatch(seat_released(&hold.key));
    }
}
