//! Read-only views of the seat-hold cache.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiErrorBody};
use crate::seats::{CurrentSeatView, GroupKey, SeatHold};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/slots/{date}/{slot_id}/holds", get(list_group_holds))
        .route("/connections/{connection_id}/seat", get(get_current_seat))
}

/// A live hold as seen by HTTP clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct HeldSeat {
    pub seat_id: i32,
    pub date: NaiveDate,
    pub slot_id: i32,
    pub connection_id: String,
    pub held_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<SeatHold> for HeldSeat {
    fn from(hold: SeatHold) -> Self {
        Self {
            seat_id: hold.key.seat_id,
            date: hold.key.date,
            slot_id: hold.key.slot_id,
            connection_id: hold.owner,
            held_at: hold.held_at,
            expires_at: hold.expires_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GroupPath {
    pub date: String,
    pub slot_id: String,
}

impl GroupPath {
    fn group(&self) -> Result<GroupKey, ApiError> {
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .map_err(|_| ApiError::bad_request("Invalid date, expected YYYY-MM-DD"))?;
        let slot_id = self
            .slot_id
            .parse()
            .map_err(|_| ApiError::bad_request("Invalid slot ID"))?;
        Ok(GroupKey::new(date, slot_id))
    }
}

// ---------------------------------------------------------------------------
// GET /api/v1/slots/:date/:slot_id/holds
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/slots/{date}/{slot_id}/holds",
    tag = "Holds",
    params(
        ("date" = String, Path, description = "Calendar date (YYYY-MM-DD)"),
        ("slot_id" = i32, Path, description = "Time slot ID"),
    ),
    responses(
        (status = 200, description = "Seats currently held in the slot", body = Vec<HeldSeat>),
        (status = 400, description = "Invalid date or slot", body = ApiErrorBody),
    ),
)]
pub async fn list_group_holds(
    State(state): State<AppState>,
    Path(path): Path<GroupPath>,
) -> Result<Json<Vec<HeldSeat>>, ApiError> {
    let group = path.group()?;
    let holds = state
        .seats
        .holds_in_group(&group)
        .into_iter()
        .map(HeldSeat::from)
        .collect();
    Ok(Json(holds))
}

// ---------------------------------------------------------------------------
// GET /api/v1/connections/:connection_id/seat
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/connections/{connection_id}/seat",
    tag = "Holds",
    params(
        ("connection_id" = String, Path, description = "Gateway connection ID"),
    ),
    responses(
        (status = 200, description = "Seat held by the connection", body = CurrentSeatView),
        (status = 404, description = "Connection holds no seat", body = ApiErrorBody),
    ),
)]
pub async fn get_current_seat(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
) -> Result<Json<CurrentSeatView>, ApiError> {
    state
        .seats
        .get_user_current_seat(&connection_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Connection holds no seat"))
}
