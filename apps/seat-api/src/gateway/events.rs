//! Gateway opcodes, event types, and wire-format messages.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::seats::{GroupKey, SeatKey};

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_JOIN_GROUP: u8 = 2;
pub const OP_LEAVE_GROUP: u8 = 3;
pub const OP_SELECT_SEAT: u8 = 4;
pub const OP_RELEASE_SEAT: u8 = 5;
pub const OP_HEARTBEAT_ACK: u8 = 6;

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

/// A message sent from the server to the client over WebSocket.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayMessage {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    pub d: Value,
}

impl GatewayMessage {
    /// Build a DISPATCH message (op=0).
    pub fn dispatch(event_name: &str, seq: u64, data: Value) -> Self {
        Self {
            op: OP_DISPATCH,
            t: Some(event_name.to_string()),
            s: Some(seq),
            d: data,
        }
    }

    /// Build a HEARTBEAT_ACK message (op=6).
    pub fn heartbeat_ack(seq: u64) -> Self {
        Self {
            op: OP_HEARTBEAT_ACK,
            t: None,
            s: None,
            d: serde_json::json!({ "ack": seq }),
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// A message received from the client over WebSocket.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
}

// ---------------------------------------------------------------------------
// HEARTBEAT payload
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub seq: u64,
}

// ---------------------------------------------------------------------------
// JOIN_GROUP / LEAVE_GROUP payload
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GroupPayload {
    pub date: NaiveDate,
    pub slot_id: i32,
}

impl GroupPayload {
    pub fn group(&self) -> GroupKey {
        GroupKey::new(self.date, self.slot_id)
    }
}

// ---------------------------------------------------------------------------
// SELECT_SEAT / RELEASE_SEAT payload
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SeatPayload {
    pub seat_id: i32,
    pub date: NaiveDate,
    pub slot_id: i32,
}

impl SeatPayload {
    pub fn key(&self) -> SeatKey {
        SeatKey::new(self.seat_id, self.date, self.slot_id)
    }
}

// ---------------------------------------------------------------------------
// Dispatch event types
// ---------------------------------------------------------------------------

/// Event names dispatched to clients.
pub struct EventName;

impl EventName {
    pub const READY: &'static str = "READY";
    pub const GROUP_JOINED: &'static str = "GROUP_JOINED";
    pub const GROUP_LEFT: &'static str = "GROUP_LEFT";
    pub const SEAT_SELECTED: &'static str = "SEAT_SELECTED";
    pub const SEAT_RELEASED: &'static str = "SEAT_RELEASED";
    pub const SEAT_ALREADY_SELECTED: &'static str = "SEAT_ALREADY_SELECTED";
}
