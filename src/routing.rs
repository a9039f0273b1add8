// src/routing.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::auction::{AuctionResult, AuctionState};

/// Why the call router has to fall back to its default handling.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    NoEligibleTargets,
    NoAcceptedBids,
    BelowMinimumBidders,
    DeadlineExceeded,
}

/// What the call router should do with the call once the auction is over.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RoutingDecision {
    #[serde(rename_all = "camelCase")]
    Transfer {
        target_id: String,
        destination: String,
        bid_amount: Decimal,
    },
    Fallback { reason: FallbackReason },
}

impl From<&AuctionResult> for RoutingDecision {
    fn from(result: &AuctionResult) -> Self {
        if let Some(winner) = &result.winner {
            return RoutingDecision::Transfer {
                target_id: winner.target_id.clone(),
                destination: winner.destination.clone(),
                bid_amount: winner.bid_amount,
            };
        }
        let reason = match result.state {
            AuctionState::NoEligibleTargets => FallbackReason::NoEligibleTargets,
            AuctionState::TimedOut => FallbackReason::DeadlineExceeded,
            _ if result.successful_responses == 0 => FallbackReason::NoAcceptedBids,
            _ => FallbackReason::BelowMinimumBidders,
        };
        RoutingDecision::Fallback { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::auction::WinnerSummary;
    use chrono::Utc;

    fn result(state: AuctionState, successful: usize) -> AuctionResult {
        AuctionResult {
            auction_id: uuid::Uuid::new_v4(),
            campaign_id: "camp-1".into(),
            state,
            total_targets_pinged: 2,
            successful_responses: successful,
            winner: None,
            all_results: vec![],
            bidding_completed_at: Utc::now(),
            total_response_time_ms: 10,
        }
    }

    #[test]
    fn test_winner_becomes_transfer() {
        let mut r = result(AuctionState::Completed, 1);
        r.winner = Some(WinnerSummary {
            target_id: "c".into(),
            target_name: "C".into(),
            bid_amount: Decimal::new(2550, 2),
            destination: "+18005550199".into(),
        });
        let json = serde_json::to_value(RoutingDecision::from(&r)).unwrap();
        assert_eq!(json["action"], "transfer");
        assert_eq!(json["targetId"], "c");
        assert_eq!(json["destination"], "+18005550199");
    }

    #[test]
    fn test_fallback_reasons() {
        let reason = |state, successful| match RoutingDecision::from(&result(state, successful)) {
            RoutingDecision::Fallback { reason } => reason,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(reason(AuctionState::NoEligibleTargets, 0), FallbackReason::NoEligibleTargets);
        assert_eq!(reason(AuctionState::TimedOut, 0), FallbackReason::DeadlineExceeded);
        assert_eq!(reason(AuctionState::Completed, 0), FallbackReason::NoAcceptedBids);
        assert_eq!(reason(AuctionState::Completed, 1), FallbackReason::BelowMinimumBidders);
    }
}
