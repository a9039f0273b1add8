// src/model/adapters.rs

use serde::de::DeserializeOwned;
use std::fs;
use tracing::warn;

use crate::model::campaign::Campaign;
use crate::model::target::Target;

/// Source of bidding configuration (targets and campaigns).
pub trait ConfigAdapter: Send + Sync {
    fn get_targets(&self) -> Vec<Target>;
    fn get_campaigns(&self) -> Vec<Campaign>;
}

pub struct FileConfigAdapter {
    pub target_file: String,
    pub campaign_file: String,
}

impl FileConfigAdapter {
    pub fn new(target_file: &str, campaign_file: &str) -> Self {
        Self {
            target_file: target_file.to_string(),
            campaign_file: campaign_file.to_string(),
        }
    }

    fn read_list<T: DeserializeOwned>(path: &str) -> Vec<T> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path, error = %e, "config file unreadable, using empty list");
                return Vec::new();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path, error = %e, "config file malformed, using empty list");
            Vec::new()
        })
    }
}

impl ConfigAdapter for FileConfigAdapter {
    fn get_targets(&self) -> Vec<Target> {
        Self::read_list(&self.target_file)
    }

    fn get_campaigns(&self) -> Vec<Campaign> {
        Self::read_list(&self.campaign_file)
    }
}
