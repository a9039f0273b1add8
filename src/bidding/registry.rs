// src/bidding/registry.rs

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::model::call::CallAttributes;
use crate::model::campaign::Campaign;
use crate::model::target::Target;

/// Read side of the target configuration, as the auction sees it.
///
/// Implementations backed by a remote store return
/// `RegistryError::Unavailable` when it cannot be reached; the API answers
/// those with 503 so the caller can retry or route the call elsewhere.
#[async_trait]
pub trait TargetRegistry: Send + Sync {
    async fn campaign(&self, campaign_id: &str) -> Result<Campaign, RegistryError>;

    /// Targets allowed to bid on this call, ordered by priority then id.
    async fn eligible_targets(
        &self,
        campaign_id: &str,
        call: &CallAttributes,
    ) -> Result<Vec<Arc<Target>>, RegistryError>;
}

/// Active flag, currency and the three geographic dimensions. Each dimension
/// is independent: exclusions always apply, and a non-empty inclusion list
/// must contain the caller's value.
pub fn is_eligible(target: &Target, call: &CallAttributes) -> bool {
    if !target.is_active {
        return false;
    }
    if let Some(currency) = call.currency.as_deref() {
        if !currency.trim().eq_ignore_ascii_case(&target.currency) {
            return false;
        }
    }

    let state = call.state();
    let zip = call.zip();
    let area_code = call.area_code();

    dimension_allows(&target.states, &target.excluded_states, state.as_deref(), normalize_code)
        && dimension_allows(&target.zip_codes, &target.excluded_zip_codes, zip.as_deref(), normalize_zip)
        && dimension_allows(
            &target.area_codes,
            &target.excluded_area_codes,
            area_code.as_deref(),
            normalize_code,
        )
}

fn dimension_allows(
    included: &[String],
    excluded: &[String],
    value: Option<&str>,
    normalize: fn(&str) -> String,
) -> bool {
    let Some(value) = value else {
        // an unknown caller value cannot prove membership of an inclusion list
        return included.is_empty();
    };
    let listed = |list: &[String]| list.iter().any(|entry| normalize(entry) == value);
    !listed(excluded) && (included.is_empty() || listed(included))
}

fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

fn normalize_zip(raw: &str) -> String {
    raw.trim().chars().take(5).collect()
}

/// Stable auction order: priority ascending, then id.
pub fn order_targets(targets: &mut [Arc<Target>]) {
    targets.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
}
