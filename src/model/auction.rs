// src/model/auction.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::bidding::template::BidRequest;
use crate::error::{StateError, TransportError};
use crate::model::call::CallAttributes;
use crate::model::campaign::Campaign;
use crate::model::target::Target;

/// Auction lifecycle. `Pending -> Dispatched -> {Completed, TimedOut}`, or
/// `Pending -> NoEligibleTargets`. Terminal states never change again.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuctionState {
    Pending,
    Dispatched,
    Completed,
    TimedOut,
    NoEligibleTargets,
}

impl AuctionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionState::Pending => "pending",
            AuctionState::Dispatched => "dispatched",
            AuctionState::Completed => "completed",
            AuctionState::TimedOut => "timed_out",
            AuctionState::NoEligibleTargets => "no_eligible_targets",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuctionState::Completed | AuctionState::TimedOut | AuctionState::NoEligibleTargets
        )
    }

    fn can_become(&self, next: AuctionState) -> bool {
        use AuctionState::*;
        matches!(
            (self, next),
            (Pending, Dispatched) | (Pending, NoEligibleTargets) | (Dispatched, Completed) | (Dispatched, TimedOut)
        )
    }
}

impl fmt::Display for AuctionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a target's bid did not count.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "code", content = "detail")]
pub enum RejectionReason {
    /// The bidder answered but declined, optionally saying why.
    Declined(Option<String>),
    Timeout,
    ConnectionFailed,
    HttpStatus(u16),
    ParseError,
    /// The body ran past the transport's size limit and was not read further.
    ResponseTooLarge,
    InvalidBidAmount,
    BelowMinimumBid,
    AboveMaximumBid,
    CurrencyMismatch,
    MissingDestination,
    /// Still in flight when the auction deadline fired.
    DeadlineExceeded,
    ConcurrencyLimited,
    TemplateError,
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::Declined(_) => "declined",
            RejectionReason::Timeout => "timeout",
            RejectionReason::ConnectionFailed => "connection_failed",
            RejectionReason::HttpStatus(_) => "http_status",
            RejectionReason::ParseError => "parse_error",
            RejectionReason::ResponseTooLarge => "response_too_large",
            RejectionReason::InvalidBidAmount => "invalid_bid_amount",
            RejectionReason::BelowMinimumBid => "below_minimum_bid",
            RejectionReason::AboveMaximumBid => "above_maximum_bid",
            RejectionReason::CurrencyMismatch => "currency_mismatch",
            RejectionReason::MissingDestination => "missing_destination",
            RejectionReason::DeadlineExceeded => "deadline_exceeded",
            RejectionReason::ConcurrencyLimited => "concurrency_limited",
            RejectionReason::TemplateError => "template_error",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::Declined(Some(why)) => write!(f, "declined: {}", why),
            RejectionReason::HttpStatus(status) => write!(f, "http_status: {}", status),
            other => f.write_str(other.code()),
        }
    }
}

/// What came back from one target: the raw exchange, or the transport failure.
#[derive(Debug, Clone, PartialEq)]
pub struct BidResponse {
    pub status_code: Option<u16>,
    pub body: Option<String>,
    pub content_type: Option<String>,
    pub response_time_ms: u64,
    pub transport_error: Option<TransportError>,
}

impl BidResponse {
    pub fn received(status_code: u16, body: String, content_type: Option<String>, response_time_ms: u64) -> Self {
        Self {
            status_code: Some(status_code),
            body: Some(body),
            content_type,
            response_time_ms,
            transport_error: None,
        }
    }

    pub fn failed(error: TransportError, response_time_ms: u64) -> Self {
        Self {
            status_code: None,
            body: None,
            content_type: None,
            response_time_ms,
            transport_error: Some(error),
        }
    }
}

/// The structured reading of a bidder's answer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParsedBid {
    pub accepted: bool,
    pub bid_amount: Option<Decimal>,
    pub destination: Option<String>,
    pub currency: Option<String>,
    pub rejection_reason: Option<RejectionReason>,
}

impl ParsedBid {
    pub fn rejected(reason: RejectionReason) -> Self {
        Self {
            accepted: false,
            bid_amount: None,
            destination: None,
            currency: None,
            rejection_reason: Some(reason),
        }
    }

    /// Downgrade to rejected, keeping whatever the bidder offered for the audit trail.
    pub fn downgrade(mut self, reason: RejectionReason) -> Self {
        self.accepted = false;
        self.rejection_reason = Some(reason);
        self
    }
}

/// One target's slot in an auction.
#[derive(Debug, Clone)]
pub struct AuctionEntry {
    pub target: Arc<Target>,
    pub request: Option<BidRequest>,
    /// `None` when the target was never called or was abandoned at the deadline.
    pub response: Option<BidResponse>,
    pub bid: ParsedBid,
    /// Whether a bid request actually went out to the target.
    pub dispatched: bool,
    pub response_time_ms: u64,
}

/// The unit of work for one call.
#[derive(Debug, Clone)]
pub struct Auction {
    pub id: Uuid,
    pub campaign_id: String,
    pub call: CallAttributes,
    pub deadline_ms: u64,
    pub min_bidders_required: usize,
    pub started_at: DateTime<Utc>,
    state: AuctionState,
    entries: Vec<AuctionEntry>,
    winner: Option<usize>,
    completed_at: Option<DateTime<Utc>>,
    total_response_time_ms: u64,
}

impl Auction {
    pub fn new(campaign: &Campaign, call: CallAttributes) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id: campaign.id.clone(),
            call,
            deadline_ms: campaign.bidding_timeout_ms,
            min_bidders_required: campaign.min_bidders_required,
            started_at: Utc::now(),
            state: AuctionState::Pending,
            entries: Vec::new(),
            winner: None,
            completed_at: None,
            total_response_time_ms: 0,
        }
    }

    pub fn state(&self) -> AuctionState {
        self.state
    }

    pub fn entries(&self) -> &[AuctionEntry] {
        &self.entries
    }

    pub fn winner(&self) -> Option<&AuctionEntry> {
        self.winner.and_then(|idx| self.entries.get(idx))
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn total_response_time_ms(&self) -> u64 {
        self.total_response_time_ms
    }

    pub fn transition(&mut self, next: AuctionState) -> Result<(), StateError> {
        if !self.state.can_become(next) {
            return Err(StateError {
                from: self.state.as_str(),
                to: next.as_str(),
            });
        }
        self.state = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Moves a dispatched auction into its terminal state together with its results.
    pub fn settle(
        &mut self,
        state: AuctionState,
        entries: Vec<AuctionEntry>,
        winner: Option<usize>,
        total_response_time_ms: u64,
    ) -> Result<(), StateError> {
        if self.state != AuctionState::Dispatched {
            return Err(StateError {
                from: self.state.as_str(),
                to: state.as_str(),
            });
        }
        self.transition(state)?;
        self.entries = entries;
        self.winner = winner.filter(|idx| *idx < self.entries.len());
        self.total_response_time_ms = total_response_time_ms;
        Ok(())
    }

    pub fn accepted_count(&self) -> usize {
        self.entries.iter().filter(|e| e.bid.accepted).count()
    }

    pub fn pinged_count(&self) -> usize {
        self.entries.iter().filter(|e| e.dispatched).count()
    }

    /// The read-only view handed back to the call router.
    pub fn result(&self) -> AuctionResult {
        let winner = self.winner().and_then(|entry| {
            Some(WinnerSummary {
                target_id: entry.target.id.clone(),
                target_name: entry.target.name.clone(),
                bid_amount: entry.bid.bid_amount?,
                destination: entry.bid.destination.clone()?,
            })
        });

        AuctionResult {
            auction_id: self.id,
            campaign_id: self.campaign_id.clone(),
            state: self.state,
            total_targets_pinged: self.pinged_count(),
            successful_responses: self.accepted_count(),
            winner,
            all_results: self
                .entries
                .iter()
                .map(|entry| TargetResult {
                    target_id: entry.target.id.clone(),
                    target_name: entry.target.name.clone(),
                    accepted: entry.bid.accepted,
                    bid_amount: entry.bid.bid_amount,
                    response_time_ms: entry.response_time_ms,
                    rejection_reason: entry.bid.rejection_reason.clone(),
                })
                .collect(),
            bidding_completed_at: self.completed_at.unwrap_or_else(Utc::now),
            total_response_time_ms: self.total_response_time_ms,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WinnerSummary {
    pub target_id: String,
    pub target_name: String,
    pub bid_amount: Decimal,
    pub destination: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetResult {
    pub target_id: String,
    pub target_name: String,
    pub accepted: bool,
    pub bid_amount: Option<Decimal>,
    pub response_time_ms: u64,
    pub rejection_reason: Option<RejectionReason>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuctionResult {
    pub auction_id: Uuid,
    pub campaign_id: String,
    pub state: AuctionState,
    pub total_targets_pinged: usize,
    pub successful_responses: usize,
    pub winner: Option<WinnerSummary>,
    pub all_results: Vec<TargetResult>,
    pub bidding_completed_at: DateTime<Utc>,
    pub total_response_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auction() -> Auction {
        Auction::new(&Campaign::new("camp-1", 3000, 1), CallAttributes::new("+14155550100"))
    }

    #[test]
    fn test_lifecycle_happy_path() {
        let mut a = auction();
        assert_eq!(a.state(), AuctionState::Pending);
        a.transition(AuctionState::Dispatched).unwrap();
        a.settle(AuctionState::Completed, vec![], None, 12).unwrap();
        assert_eq!(a.state(), AuctionState::Completed);
        assert!(a.completed_at().is_some());
        assert_eq!(a.total_response_time_ms(), 12);
    }

    #[test]
    fn test_terminal_states_are_immutable() {
        let mut a = auction();
        a.transition(AuctionState::NoEligibleTargets).unwrap();
        assert!(a.transition(AuctionState::Dispatched).is_err());
        assert!(a.settle(AuctionState::Completed, vec![], None, 0).is_err());
        assert_eq!(a.state(), AuctionState::NoEligibleTargets);

        let mut b = auction();
        b.transition(AuctionState::Dispatched).unwrap();
        b.settle(AuctionState::TimedOut, vec![], None, 0).unwrap();
        let err = b.transition(AuctionState::Completed).unwrap_err();
        assert_eq!(err.from, "timed_out");
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        let mut a = auction();
        assert!(a.transition(AuctionState::Completed).is_err());
    }

    #[test]
    fn test_rejection_reason_wire_format() {
        let json = serde_json::to_value(RejectionReason::HttpStatus(503)).unwrap();
        assert_eq!(json, serde_json::json!({"code": "http_status", "detail": 503}));
        let json = serde_json::to_value(RejectionReason::Timeout).unwrap();
        assert_eq!(json, serde_json::json!({"code": "timeout"}));
        assert_eq!(RejectionReason::Declined(Some("capacity".into())).to_string(), "declined: capacity");
    }
}
