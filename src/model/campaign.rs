// src/model/campaign.rs

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// Campaign-level auction settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: String,
    /// Wall-clock budget for the whole dispatch phase.
    #[serde(default = "default_bidding_timeout")]
    pub bidding_timeout_ms: u64,
    #[serde(default = "default_min_bidders")]
    pub min_bidders_required: usize,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_bidding_timeout() -> u64 {
    3000
}

fn default_min_bidders() -> usize {
    1
}

fn default_active() -> bool {
    true
}

impl Campaign {
    pub fn new(id: &str, bidding_timeout_ms: u64, min_bidders_required: usize) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            bidding_timeout_ms,
            min_bidders_required,
            is_active: true,
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.bidding_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidCampaign {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.bidding_timeout_ms == 0 {
            return Err(invalid("biddingTimeoutMs must be greater than zero"));
        }
        if self.min_bidders_required == 0 {
            return Err(invalid("minBiddersRequired must be at least 1"));
        }
        Ok(())
    }
}
