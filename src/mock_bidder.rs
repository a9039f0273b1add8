// src/mock_bidder.rs

use axum::extract::RawQuery;
use axum::routing::get;
use axum::{serve, Json, Router};
use rand::Rng;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};
use tracing::info;

/// Simulated buyer: answers after 100 to 300ms with a random bid, and
/// declines roughly one call in five.
async fn bid(payload: String) -> Json<Value> {
    let (delay_ms, declined, amount, line) = {
        let mut rng = rand::thread_rng();
        (
            rng.gen_range(100..300),
            rng.gen_bool(0.2),
            rng.gen_range(500..5000),
            rng.gen_range(1000..9999),
        )
    };
    info!(request_bytes = payload.len(), delay_ms, declined, "mock bidder received bid request");
    sleep(Duration::from_millis(delay_ms)).await;

    if declined {
        return Json(json!({ "accepted": false, "reason": "no capacity" }));
    }
    Json(json!({
        "accepted": true,
        "bid": amount as f64 / 100.0,
        "currency": "USD",
        "destination": format!("+1800555{:04}", line),
    }))
}

async fn ping(RawQuery(query): RawQuery) -> Json<Value> {
    bid(query.unwrap_or_default()).await
}

pub fn router() -> Router {
    Router::new().route("/bid", get(ping).post(bid))
}

/// Serves the mock bidder on `0.0.0.0:{port}` until the process stops.
pub async fn start_mock_bidder_server(port: u16) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Mock bidder running at http://{}", addr);
    serve(listener, router()).await
}
