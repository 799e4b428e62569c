#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;

use seat_api::config::Config;
use seat_api::AppState;

/// Build a test AppState with the given hold TTL.
pub fn test_state(hold_ttl: Duration) -> AppState {
    AppState::new(Config { port: 0, hold_ttl })
}

/// Build the full application router wired to a fresh test state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state(Duration::from_secs(60));
    let app = seat_api::routes::router().with_state(state.clone());
    (app, state)
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background for the rest of the test.
pub async fn start_ws_server(hold_ttl: Duration) -> (SocketAddr, AppState) {
    let state = test_state(hold_ttl);
    let app = seat_api::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}
