//! Client action dispatch: join/leave group, select/release seat, disconnect.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::seats::SelectionOutcome;
use crate::AppState;

use super::events::{
    EventName, GroupPayload, SeatPayload, OP_JOIN_GROUP, OP_LEAVE_GROUP, OP_RELEASE_SEAT,
    OP_SELECT_SEAT,
};
use super::notify;
use super::session::GatewaySession;

/// Heartbeat interval sent to clients in the READY payload (ms).
pub const HEARTBEAT_INTERVAL_MS: u64 = 41250;

/// A dispatch addressed to the requesting connection only.
#[derive(Debug)]
pub struct DirectReply {
    pub event_name: &'static str,
    pub data: Value,
}

/// Build the READY payload for a freshly opened connection.
pub fn ready_payload(state: &AppState, session: &GatewaySession) -> Value {
    serde_json::json!({
        "connection_id": session.connection_id,
        "heartbeat_interval": HEARTBEAT_INTERVAL_MS,
        "hold_ttl_secs": state.seats.ttl().as_secs(),
    })
}

/// Process one client action opcode.
///
/// Group broadcasts are published here; anything meant for the caller alone
/// is returned. An `Err` means the payload was malformed.
pub fn handle_action(
    state: &AppState,
    session: &GatewaySession,
    op: u8,
    data: Value,
) -> Result<Option<DirectReply>, &'static str> {
    match op {
        OP_JOIN_GROUP => {
            let payload: GroupPayload = decode(data, "invalid join payload")?;
            Ok(Some(join_group(state, session, payload)))
        }
        OP_LEAVE_GROUP => {
            let payload: GroupPayload = decode(data, "invalid leave payload")?;
            Ok(Some(leave_group(session, payload)))
        }
        OP_SELECT_SEAT => {
            let payload: SeatPayload = decode(data, "invalid select payload")?;
            Ok(select_seat(state, session, payload))
        }
        OP_RELEASE_SEAT => {
            let payload: SeatPayload = decode(data, "invalid release payload")?;
            release_seat(state, session, payload);
            Ok(None)
        }
        _ => Err("unknown action opcode"),
    }
}

fn decode<T: DeserializeOwned>(data: Value, reason: &'static str) -> Result<T, &'static str> {
    serde_json::from_value(data).map_err(|_| reason)
}

fn join_group(state: &AppState, session: &GatewaySession, payload: GroupPayload) -> DirectReply {
    let group = payload.group();
    if session.join(group) {
        tracing::debug!(connection_id = %session.connection_id, %group, "joined group");
    }

    let holds = state.seats.holds_in_group(&group);
    DirectReply {
        event_name: EventName::GROUP_JOINED,
        data: notify::group_snapshot(&group, &holds),
    }
}

fn leave_group(session: &GatewaySession, payload: GroupPayload) -> DirectReply {
    let group = payload.group();
    if session.leave(&group) {
        tracing::debug!(connection_id = %session.connection_id, %group, "left group");
    }

    DirectReply {
        event_name: EventName::GROUP_LEFT,
        data: serde_json::json!({ "date": group.date, "slot_id": group.slot_id }),
    }
}

fn select_seat(state: &AppState, session: &GatewaySession, payload: SeatPayload) -> Option<DirectReply> {
    let outcome = state.seats.try_select_seat(
        payload.seat_id,
        payload.date,
        payload.slot_id,
        &session.connection_id,
    );

    // Group events for successful outcomes are published by the cache itself.
    match outcome {
        SelectionOutcome::Acquired { .. } | SelectionOutcome::AlreadyHeld => None,
        SelectionOutcome::Taken => Some(DirectReply {
            event_name: EventName::SEAT_ALREADY_SELECTED,
            data: notify::seat_already_selected(payload.seat_id),
        }),
    }
}

fn release_seat(state: &AppState, session: &GatewaySession, payload: SeatPayload) {
    let released = state.seats.release_seat(
        payload.seat_id,
        payload.date,
        payload.slot_id,
        &session.connection_id,
    );

    // Not owning the seat is a lost race or a stale client; nothing to say.
    if !released {
        tracing::debug!(connection_id = %session.connection_id, seat = %payload.key(), "release ignored");
    }
}

/// Release the connection's seat (if any); the cache tells its group.
pub fn handle_disconnect(state: &AppState, connection_id: &str) {
    if let Some(key) = state.seats.disconnect(connection_id) {
        tracing::debug!(connection_id, seat = %key, "released seat of closed connection");
    }
}
