// src/api/handlers.rs

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use crate::api::AppState;
use crate::bidding::health::TargetHealth;
use crate::error::{AuctionError, ConfigError, RegistryError};
use crate::model::auction::AuctionResult;
use crate::model::call::CallAttributes;
use crate::model::target::Target;
use crate::routing::RoutingDecision;

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuctionResponse {
    #[serde(flatten)]
    pub result: AuctionResult,
    pub routing: RoutingDecision,
}

pub enum ApiError {
    Auction(AuctionError),
    Config(ConfigError),
    NotFound(String),
}

impl From<AuctionError> for ApiError {
    fn from(err: AuctionError) -> Self {
        ApiError::Auction(err)
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::Config(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Auction(AuctionError::Registry(
                e @ (RegistryError::UnknownCampaign(_) | RegistryError::InactiveCampaign(_)),
            )) => (StatusCode::NOT_FOUND, e.to_string()),
            ApiError::Auction(AuctionError::Registry(e @ RegistryError::Unavailable(_))) => {
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
            ApiError::Auction(e) => {
                error!(error = %e, "auction failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            ApiError::Config(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, what),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// **Runs one auction for an inbound call**
pub async fn run_auction(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
    Json(call): Json<CallAttributes>,
) -> Result<Json<AuctionResponse>, ApiError> {
    let auction = state.engine.run_auction(&campaign_id, call).await?;
    let result = auction.result();
    let routing = RoutingDecision::from(&result);
    Ok(Json(AuctionResponse { result, routing }))
}

pub async fn register_target(
    State(state): State<Arc<AppState>>,
    Json(target): Json<Target>,
) -> Result<(StatusCode, Json<Target>), ApiError> {
    let target = state.config.register_target(target)?;
    Ok((StatusCode::CREATED, Json(Target::clone(&target))))
}

pub async fn remove_target(
    State(state): State<Arc<AppState>>,
    Path(target_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.config.remove_target(&target_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("unknown target {}", target_id)))
    }
}

pub async fn target_health(State(state): State<Arc<AppState>>) -> Json<Vec<TargetHealth>> {
    Json(state.health.snapshot())
}
