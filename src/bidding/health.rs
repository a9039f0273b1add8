// src/bidding/health.rs

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::bidding::transport::{elapsed_ms, BidTransport};
use crate::config::ConfigManager;
use crate::model::target::Target;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Rolling availability of one target, as seen by the check loop.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetHealth {
    pub target_id: String,
    pub target_name: String,
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub uptime_percent: f64,
    pub checks: u64,
    pub checked_at: DateTime<Utc>,
    #[serde(skip)]
    successes: u64,
}

/// Checks targets out of band. Auctions never wait on it and never consult it.
pub struct HealthMonitor {
    transport: Arc<dyn BidTransport>,
    stats: DashMap<String, TargetHealth>,
}

impl HealthMonitor {
    pub fn new(transport: Arc<dyn BidTransport>) -> Self {
        Self {
            transport,
            stats: DashMap::new(),
        }
    }

    /// Checks one target. Any response below 500 counts as reachable.
    pub async fn check(&self, target: &Target) -> TargetHealth {
        let started = Instant::now();
        let healthy = match self.transport.ping(target).await {
            Ok(raw) => raw.status < 500,
            Err(e) => {
                debug!(target_id = %target.id, error = %e, "health check failed");
                false
            }
        };
        let response_time_ms = elapsed_ms(started);

        let mut entry = self.stats.entry(target.id.clone()).or_insert_with(|| TargetHealth {
            target_id: target.id.clone(),
            target_name: target.name.clone(),
            status: HealthStatus::Unhealthy,
            response_time_ms: 0,
            uptime_percent: 0.0,
            checks: 0,
            checked_at: Utc::now(),
            successes: 0,
        });
        let health = entry.value_mut();
        health.target_name = target.name.clone();
        health.checks += 1;
        if healthy {
            health.successes += 1;
        }
        health.status = if healthy { HealthStatus::Healthy } else { HealthStatus::Unhealthy };
        health.response_time_ms = response_time_ms;
        health.uptime_percent = health.successes as f64 * 100.0 / health.checks as f64;
        health.checked_at = Utc::now();
        health.clone()
    }

    /// Checks all given targets concurrently and forgets targets no longer listed.
    pub async fn check_all(&self, targets: &[Arc<Target>]) {
        let current: HashSet<&str> = targets.iter().map(|t| t.id.as_str()).collect();
        self.stats.retain(|id, _| current.contains(id.as_str()));

        let results = join_all(targets.iter().map(|t| self.check(t))).await;
        let unhealthy = results.iter().filter(|h| h.status == HealthStatus::Unhealthy).count();
        if unhealthy > 0 {
            warn!(unhealthy, total = results.len(), "targets failing health checks");
        }
    }

    pub fn snapshot(&self) -> Vec<TargetHealth> {
        let mut all: Vec<_> = self.stats.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        all
    }

    pub fn spawn(self: Arc<Self>, config: Arc<ConfigManager>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.check_all(&config.active_targets()).await;
            }
        })
    }
}
