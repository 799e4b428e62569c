pub mod config;
pub mod error;
pub mod gateway;
pub mod routes;
pub mod seats;

use std::sync::Arc;

use config::Config;
use gateway::fanout::GatewayBroadcast;
use seats::SeatCacheService;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub seats: SeatCacheService,
    pub broadcast: Arc<GatewayBroadcast>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let broadcast = Arc::new(GatewayBroadcast::new());
        Self {
            seats: SeatCacheService::with_listener(config.hold_ttl, broadcast.clone()),
            broadcast,
            config: Arc::new(config),
        }
    }
}
