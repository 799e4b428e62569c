pub mod health;
pub mod holds;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest("/api/v1", holds::router())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Holds
        holds::list_group_holds,
        holds::get_current_seat,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            // Route request/response types
            health::HealthResponse,
            holds::HeldSeat,
            crate::seats::CurrentSeatView,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Holds", description = "Seat hold queries"),
    )
)]
pub struct ApiDoc;
