// src/config/config_manager.rs

use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::bidding::registry::{is_eligible, order_targets, TargetRegistry};
use crate::error::{ConfigError, RegistryError};
use crate::model::adapters::ConfigAdapter;
use crate::model::call::CallAttributes;
use crate::model::campaign::Campaign;
use crate::model::target::Target;

#[derive(Clone, Default)]
struct Snapshot {
    targets: HashMap<String, Arc<Target>>,
    campaigns: HashMap<String, Campaign>,
}

/// Holds the live target and campaign configuration.
///
/// Readers take a consistent snapshot without locking; writers swap in a new
/// one. An auction that already resolved its targets keeps the old snapshot.
pub struct ConfigManager {
    snapshot: ArcSwap<Snapshot>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
        }
    }

    pub fn from_adapter(adapter: &dyn ConfigAdapter) -> Self {
        let manager = Self::new();
        manager.reload(adapter.get_targets(), adapter.get_campaigns());
        manager
    }

    /// Replaces the whole configuration. Invalid entries are logged and skipped.
    pub fn reload(&self, targets: Vec<Target>, campaigns: Vec<Campaign>) {
        let mut next = Snapshot::default();
        for campaign in campaigns {
            match campaign.validate() {
                Ok(()) => {
                    next.campaigns.insert(campaign.id.clone(), campaign);
                }
                Err(e) => warn!(error = %e, "skipping invalid campaign"),
            }
        }
        for target in targets {
            match target.validate() {
                Ok(()) => {
                    next.targets.insert(target.id.clone(), Arc::new(target));
                }
                Err(e) => warn!(error = %e, "skipping invalid target"),
            }
        }
        info!(
            targets = next.targets.len(),
            campaigns = next.campaigns.len(),
            "bidding configuration loaded"
        );
        self.snapshot.store(Arc::new(next));
    }

    /// Adds or replaces a target after validating it.
    pub fn register_target(&self, target: Target) -> Result<Arc<Target>, ConfigError> {
        target.validate()?;
        let target = Arc::new(target);
        self.snapshot.rcu(|current| {
            let mut next = Snapshot::clone(current);
            next.targets.insert(target.id.clone(), Arc::clone(&target));
            next
        });
        info!(target_id = %target.id, campaign_id = %target.campaign_id, "target registered");
        Ok(target)
    }

    /// Returns whether the target existed.
    pub fn remove_target(&self, target_id: &str) -> bool {
        let mut removed = false;
        self.snapshot.rcu(|current| {
            let mut next = Snapshot::clone(current);
            removed = next.targets.remove(target_id).is_some();
            next
        });
        if removed {
            info!(target_id, "target removed");
        }
        removed
    }

    pub fn register_campaign(&self, campaign: Campaign) -> Result<(), ConfigError> {
        campaign.validate()?;
        self.snapshot.rcu(|current| {
            let mut next = Snapshot::clone(current);
            next.campaigns.insert(campaign.id.clone(), campaign.clone());
            next
        });
        Ok(())
    }

    pub fn target(&self, target_id: &str) -> Option<Arc<Target>> {
        self.snapshot.load().targets.get(target_id).cloned()
    }

    /// Every active target across campaigns, in auction order.
    pub fn active_targets(&self) -> Vec<Arc<Target>> {
        let mut targets: Vec<_> = self
            .snapshot
            .load()
            .targets
            .values()
            .filter(|t| t.is_active)
            .cloned()
            .collect();
        order_targets(&mut targets);
        targets
    }
}

#[async_trait]
impl TargetRegistry for ConfigManager {
    async fn campaign(&self, campaign_id: &str) -> Result<Campaign, RegistryError> {
        let snapshot = self.snapshot.load();
        let campaign = snapshot
            .campaigns
            .get(campaign_id)
            .ok_or_else(|| RegistryError::UnknownCampaign(campaign_id.to_string()))?;
        if !campaign.is_active {
            return Err(RegistryError::InactiveCampaign(campaign_id.to_string()));
        }
        Ok(campaign.clone())
    }

    async fn eligible_targets(
        &self,
        campaign_id: &str,
        call: &CallAttributes,
    ) -> Result<Vec<Arc<Target>>, RegistryError> {
        let snapshot = self.snapshot.load();
        let mut targets: Vec<_> = snapshot
            .targets
            .values()
            .filter(|t| t.campaign_id == campaign_id && is_eligible(t, call))
            .cloned()
            .collect();
        order_targets(&mut targets);
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::target::tests::target;

    fn manager() -> ConfigManager {
        let manager = ConfigManager::new();
        let mut inactive = target("c");
        inactive.is_active = false;
        let mut other = target("d");
        other.campaign_id = "camp-2".into();
        let mut first = target("b");
        first.priority = 0;
        let mut second = target("a");
        second.priority = 5;
        manager.reload(
            vec![second, first, inactive, other],
            vec![Campaign::new("camp-1", 3000, 1), Campaign::new("camp-2", 3000, 1)],
        );
        manager
    }

    #[tokio::test]
    async fn test_eligible_targets_filtered_and_ordered() {
        let manager = manager();
        let call = CallAttributes::new("+14155550100");
        let ids: Vec<_> = manager
            .eligible_targets("camp-1", &call)
            .await
            .unwrap()
            .iter()
            .map(|t| t.id.clone())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_campaigns() {
        let manager = manager();
        assert_eq!(
            manager.campaign("nope").await.unwrap_err(),
            RegistryError::UnknownCampaign("nope".into())
        );
        let mut paused = Campaign::new("paused", 3000, 1);
        paused.is_active = false;
        manager.register_campaign(paused).unwrap();
        assert_eq!(
            manager.campaign("paused").await.unwrap_err(),
            RegistryError::InactiveCampaign("paused".into())
        );
    }

    #[test]
    fn test_reload_skips_invalid_entries() {
        let manager = ConfigManager::new();
        let mut broken = target("broken");
        broken.timeout_ms = 0;
        manager.reload(vec![target("ok"), broken], vec![Campaign::new("camp-1", 0, 1)]);
        assert!(manager.target("ok").is_some());
        assert!(manager.target("broken").is_none());
        assert!(manager.snapshot.load().campaigns.is_empty());
    }

    #[test]
    fn test_register_and_remove_target() {
        let manager = ConfigManager::new();
        let mut invalid = target("x");
        invalid.endpoint_url = "ftp://example.com".into();
        assert!(matches!(
            manager.register_target(invalid),
            Err(ConfigError::InvalidTarget { .. })
        ));

        manager.register_target(target("x")).unwrap();
        assert_eq!(manager.active_targets().len(), 1);
        assert!(manager.remove_target("x"));
        assert!(!manager.remove_target("x"));
        assert!(manager.active_targets().is_empty());
    }
}
