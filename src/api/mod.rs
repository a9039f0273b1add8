pub mod handlers;

use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;

use crate::bidding::engine::AuctionEngine;
use crate::bidding::health::HealthMonitor;
use crate::config::ConfigManager;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AuctionEngine>,
    pub config: Arc<ConfigManager>,
    pub health: Arc<HealthMonitor>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/campaigns/{campaign_id}/auctions", post(handlers::run_auction))
        .route("/targets", post(handlers::register_target))
        .route("/targets/{target_id}", delete(handlers::remove_target))
        .route("/targets/health", get(handlers::target_health))
        .with_state(Arc::new(state))
}
