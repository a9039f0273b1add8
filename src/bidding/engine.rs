// src/bidding/engine.rs

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::bidding::extractor;
use crate::bidding::registry::TargetRegistry;
use crate::bidding::selection;
use crate::bidding::template::{self, AuctionContext, BidRequest};
use crate::bidding::transport::{elapsed_ms, BidTransport};
use crate::error::AuctionError;
use crate::logging::ledger::AuctionLedger;
use crate::model::auction::{Auction, AuctionEntry, AuctionState, BidResponse, ParsedBid, RejectionReason};
use crate::model::call::{redact_caller_id, CallAttributes};
use crate::model::campaign::Campaign;
use crate::model::target::Target;

const LOGGED_BODY_LIMIT: usize = 256;

/// What one target's pipeline hands back: slot index plus its results.
type Settled = (usize, BidResponse, ParsedBid);

enum Reservation {
    Unlimited,
    Held { _permit: OwnedSemaphorePermit },
    Exhausted,
}

/// Runs auctions: fans bid requests out to every eligible target, waits for
/// all of them or the campaign deadline, whichever comes first, and picks the winner.
pub struct AuctionEngine {
    registry: Arc<dyn TargetRegistry>,
    transport: Arc<dyn BidTransport>,
    ledger: Arc<dyn AuctionLedger>,
    /// Outbound bid requests in flight across all auctions.
    in_flight: Arc<Semaphore>,
    /// Per-target caps, keyed by target id and cap.
    target_slots: DashMap<String, Arc<Semaphore>>,
}

impl AuctionEngine {
    pub fn new(
        registry: Arc<dyn TargetRegistry>,
        transport: Arc<dyn BidTransport>,
        ledger: Arc<dyn AuctionLedger>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            registry,
            transport,
            ledger,
            in_flight: Arc::new(Semaphore::new(max_in_flight.max(1))),
            target_slots: DashMap::new(),
        }
    }

    /// Runs one auction for one call.
    ///
    /// Only a failure to resolve the campaign or its eligible targets is an
    /// error. Everything that goes wrong with individual targets ends up as a
    /// rejected entry, and "no winner" is a normal outcome.
    pub async fn run_auction(&self, campaign_id: &str, call: CallAttributes) -> Result<Auction, AuctionError> {
        let campaign = self.registry.campaign(campaign_id).await?;
        let auction = Auction::new(&campaign, call);
        let span = info_span!(
            "auction",
            auction_id = %auction.id,
            campaign_id = %campaign.id,
            caller_id = %auction.call.masked_caller_id()
        );
        self.run(campaign, auction).instrument(span).await
    }

    async fn run(&self, campaign: Campaign, mut auction: Auction) -> Result<Auction, AuctionError> {
        let targets = self.registry.eligible_targets(&campaign.id, &auction.call).await?;

        if targets.is_empty() {
            auction.transition(AuctionState::NoEligibleTargets)?;
            info!(state = %auction.state(), "no eligible targets");
            self.record(&auction);
            return Ok(auction);
        }

        auction.transition(AuctionState::Dispatched)?;
        let started = Instant::now();
        let deadline = started + campaign.deadline();
        let ctx = AuctionContext {
            auction_id: auction.id,
            campaign_id: campaign.id.clone(),
            call: auction.call.clone(),
        };

        // one slot per target, filled by index; no shared collection between tasks
        let mut requests: Vec<Option<BidRequest>> = vec![None; targets.len()];
        let mut slots: Vec<Option<AuctionEntry>> = vec![None; targets.len()];
        let mut tasks: JoinSet<Settled> = JoinSet::new();

        for (idx, target) in targets.iter().enumerate() {
            let reservation = match self.reserve(target) {
                Reservation::Exhausted => {
                    debug!(target_id = %target.id, "target at its concurrency cap, skipped");
                    slots[idx] = Some(skipped(target, RejectionReason::ConcurrencyLimited));
                    continue;
                }
                other => other,
            };
            let request = match template::build(target, &ctx) {
                Ok(request) => request,
                Err(e) => {
                    warn!(target_id = %target.id, error = %e, "bid request could not be built");
                    slots[idx] = Some(skipped(target, RejectionReason::TemplateError));
                    continue;
                }
            };

            let transport = Arc::clone(&self.transport);
            let in_flight = Arc::clone(&self.in_flight);
            let target = Arc::clone(target);
            requests[idx] = Some(request.clone());
            tasks.spawn(async move {
                let _reservation = reservation;
                let _permit = in_flight.acquire_owned().await;
                let response = transport.send(&target, &request).await;
                let parsed = extractor::extract(&target, &response);
                (idx, response, parsed)
            });
        }

        let sleep = sleep_until(deadline);
        tokio::pin!(sleep);
        let mut deadline_hit = false;
        loop {
            tokio::select! {
                biased;
                joined = tasks.join_next() => match joined {
                    Some(Ok((idx, response, parsed))) => {
                        if parsed.rejection_reason == Some(RejectionReason::ParseError) {
                            let body = response.body.as_deref().unwrap_or_default();
                            debug!(
                                target_id = %targets[idx].id,
                                body = %logged_body(body, &auction.call.caller_id),
                                "unparseable bid response"
                            );
                        }
                        slots[idx] = Some(AuctionEntry {
                            target: Arc::clone(&targets[idx]),
                            request: requests[idx].take(),
                            response_time_ms: response.response_time_ms,
                            response: Some(response),
                            bid: parsed,
                            dispatched: true,
                        });
                    }
                    Some(Err(e)) => error!(error = %e, "bid task failed"),
                    None => break,
                },
                _ = &mut sleep => {
                    deadline_hit = true;
                    break;
                }
            }
        }
        // whatever is still running is abandoned; a late answer is never looked at
        tasks.abort_all();
        let total_ms = elapsed_ms(started);

        let entries: Vec<AuctionEntry> = slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| AuctionEntry {
                    target: Arc::clone(&targets[idx]),
                    request: requests[idx].take(),
                    response: None,
                    bid: ParsedBid::rejected(if deadline_hit {
                        RejectionReason::DeadlineExceeded
                    } else {
                        RejectionReason::ConnectionFailed
                    }),
                    dispatched: true,
                    response_time_ms: total_ms,
                })
            })
            .map(|mut entry| {
                entry.bid = selection::score(&entry.target, &auction.call, entry.bid);
                entry
            })
            .collect();

        let accepted = entries.iter().filter(|e| e.bid.accepted).count();
        let enough = accepted >= auction.min_bidders_required;
        let state = if deadline_hit && !enough {
            AuctionState::TimedOut
        } else {
            AuctionState::Completed
        };
        let winner = if enough { selection::select_winner(&entries) } else { None };

        for entry in &entries {
            debug!(
                target_id = %entry.target.id,
                accepted = entry.bid.accepted,
                bid_amount = ?entry.bid.bid_amount,
                response_time_ms = entry.response_time_ms,
                rejection_reason = ?entry.bid.rejection_reason,
                "target result"
            );
        }

        auction.settle(state, entries, winner, total_ms)?;
        info!(
            state = %auction.state(),
            targets_pinged = auction.pinged_count(),
            accepted,
            deadline_hit,
            winner = ?auction.winner().map(|w| w.target.id.as_str()),
            winning_bid = ?auction.winner().and_then(|w| w.bid.bid_amount),
            total_response_time_ms = total_ms,
            "auction finished"
        );

        self.record(&auction);
        Ok(auction)
    }

    fn reserve(&self, target: &Target) -> Reservation {
        let Some(cap) = target.max_concurrency else {
            return Reservation::Unlimited;
        };
        let semaphore = self
            .target_slots
            .entry(format!("{}:{}", target.id, cap))
            .or_insert_with(|| Arc::new(Semaphore::new(cap as usize)))
            .value()
            .clone();
        match semaphore.try_acquire_owned() {
            Ok(permit) => Reservation::Held { _permit: permit },
            Err(_) => Reservation::Exhausted,
        }
    }

    fn record(&self, auction: &Auction) {
        if let Err(e) = self.ledger.record(auction) {
            warn!(auction_id = %auction.id, error = %e, "auction ledger write failed");
        }
    }
}

fn logged_body(body: &str, caller_id: &str) -> String {
    redact_caller_id(body, caller_id).chars().take(LOGGED_BODY_LIMIT).collect()
}

/// Entry for a target that was never called.
fn skipped(target: &Arc<Target>, reason: RejectionReason) -> AuctionEntry {
    AuctionEntry {
        target: Arc::clone(target),
        request: None,
        response: None,
        bid: ParsedBid::rejected(reason),
        dispatched: false,
        response_time_ms: 0,
    }
}
