// src/main.rs

use anyhow::Context;
use axum::serve;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use call_rtb::api::{self, AppState};
use call_rtb::bidding::engine::AuctionEngine;
use call_rtb::bidding::health::HealthMonitor;
use call_rtb::bidding::transport::HttpTransport;
use call_rtb::config::{ConfigManager, Settings};
use call_rtb::logging::ledger::FileLedger;
use call_rtb::mock_bidder;
use call_rtb::model::adapters::FileConfigAdapter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();

    // process log: json lines, hourly files
    let log_file = rolling::hourly(&settings.log_dir, "call_rtb.json");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);
    let subscriber = Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(non_blocking));
    tracing::subscriber::set_global_default(subscriber).context("unable to set global tracing subscriber")?;
    info!(port = settings.port, "call rtb server starting");

    if let Some(port) = settings.mock_bidder_port {
        tokio::spawn(async move {
            if let Err(e) = mock_bidder::start_mock_bidder_server(port).await {
                error!(error = %e, "mock bidder stopped");
            }
        });
    }

    let ledger = FileLedger::new(
        &settings.log_dir,
        "auctions",
        settings.ledger_buffer_size,
        settings.ledger_batch_size,
        settings.ledger_flush_interval_ms,
        settings.log_retention_hours,
    )
    .context("unable to open auction ledger")?;

    let adapter = FileConfigAdapter::new(&settings.targets_file, &settings.campaigns_file);
    let config = Arc::new(ConfigManager::from_adapter(&adapter));
    let transport = Arc::new(HttpTransport::new());

    let engine = Arc::new(AuctionEngine::new(
        config.clone(),
        transport.clone(),
        ledger.clone(),
        settings.max_in_flight,
    ));

    let health = Arc::new(HealthMonitor::new(transport));
    if let Some(interval) = settings.health_interval() {
        health.clone().spawn(config.clone(), interval);
    }

    let app = api::router(AppState {
        engine,
        config,
        health,
    });
    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("unable to bind {}", addr))?;
    info!("call rtb server running at http://{}", addr);

    serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            info!("shutting down gracefully");
        })
        .await
        .context("server error")?;

    if let Err(e) = ledger.flush().await {
        error!(error = %e, "auction ledger flush failed");
    }
    info!("call rtb server shut down");
    Ok(())
}
