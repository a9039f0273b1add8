// src/logging/auction_log.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::bidding::template::BidBindings;
use crate::model::auction::{Auction, AuctionEntry, AuctionState, RejectionReason};
use crate::model::call::redact_caller_id;

const RAW_BODY_LIMIT: usize = 512;

/// **Ledger entry for one auction**
#[derive(Serialize, Debug, Clone)]
pub struct AuctionRecord {
    pub timestamp: String,
    pub log_type: String,
    pub auction_id: String,
    pub campaign_id: String,
    pub state: AuctionState,
    /// Masked.
    pub caller_id: String,
    pub caller_state: Option<String>,
    pub caller_zip: Option<String>,
    pub caller_area_code: Option<String>,
    pub deadline_ms: u64,
    pub min_bidders_required: usize,
    pub targets_pinged: usize,
    pub accepted_bids: usize,
    pub winning_target: Option<String>,
    pub winning_amount: Option<Decimal>,
    pub destination: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_response_time_ms: u64,
    pub bids: Vec<TargetBidLog>,
}

/// **One target's part in the auction**
#[derive(Serialize, Debug, Clone)]
pub struct TargetBidLog {
    pub target_id: String,
    pub target_name: String,
    pub endpoint_url: String,
    pub dispatched: bool,
    pub request: Option<BidBindings>,
    pub template_warnings: Vec<String>,
    pub status_code: Option<u16>,
    pub transport_error: Option<String>,
    pub response_time_ms: u64,
    pub accepted: bool,
    pub bid_amount: Option<Decimal>,
    pub destination: Option<String>,
    pub currency: Option<String>,
    pub rejection_reason: Option<RejectionReason>,
    /// Caller id masked, then truncated.
    pub raw_body: Option<String>,
}

impl TargetBidLog {
    pub fn new(entry: &AuctionEntry, caller_id: &str) -> Self {
        let response = entry.response.as_ref();
        Self {
            target_id: entry.target.id.clone(),
            target_name: entry.target.name.clone(),
            endpoint_url: entry.target.endpoint_url.clone(),
            dispatched: entry.dispatched,
            request: entry.request.as_ref().map(|r| r.bindings.masked()),
            template_warnings: entry.request.as_ref().map(|r| r.warnings.clone()).unwrap_or_default(),
            status_code: response.and_then(|r| r.status_code),
            transport_error: response.and_then(|r| r.transport_error.as_ref()).map(|e| e.to_string()),
            response_time_ms: entry.response_time_ms,
            accepted: entry.bid.accepted,
            bid_amount: entry.bid.bid_amount,
            destination: entry.bid.destination.clone(),
            currency: entry.bid.currency.clone(),
            rejection_reason: entry.bid.rejection_reason.clone(),
            raw_body: response
                .and_then(|r| r.body.as_deref())
                .map(|body| redact_caller_id(body, caller_id).chars().take(RAW_BODY_LIMIT).collect()),
        }
    }
}

impl From<&Auction> for AuctionRecord {
    fn from(auction: &Auction) -> Self {
        let winner = auction.winner();
        Self {
            timestamp: Utc::now().to_rfc3339(),
            log_type: "auction".to_string(),
            auction_id: auction.id.to_string(),
            campaign_id: auction.campaign_id.clone(),
            state: auction.state(),
            caller_id: auction.call.masked_caller_id(),
            caller_state: auction.call.state(),
            caller_zip: auction.call.zip(),
            caller_area_code: auction.call.area_code(),
            deadline_ms: auction.deadline_ms,
            min_bidders_required: auction.min_bidders_required,
            targets_pinged: auction.pinged_count(),
            accepted_bids: auction.accepted_count(),
            winning_target: winner.map(|w| w.target.id.clone()),
            winning_amount: winner.and_then(|w| w.bid.bid_amount),
            destination: winner.and_then(|w| w.bid.destination.clone()),
            started_at: auction.started_at,
            completed_at: auction.completed_at(),
            total_response_time_ms: auction.total_response_time_ms(),
            bids: auction
                .entries()
                .iter()
                .map(|entry| TargetBidLog::new(entry, &auction.call.caller_id))
                .collect(),
        }
    }
}
