// src/bidding/selection.rs

use rust_decimal::Decimal;
use std::cmp::Ordering;

use crate::model::auction::{AuctionEntry, ParsedBid, RejectionReason};
use crate::model::call::CallAttributes;
use crate::model::target::Target;

/// Applies the target's economics to an extracted bid. Accepted bids that
/// break a bound are downgraded to rejected; rejected bids pass through.
pub fn score(target: &Target, call: &CallAttributes, bid: ParsedBid) -> ParsedBid {
    if !bid.accepted {
        return bid;
    }
    let amount = match bid.bid_amount {
        Some(amount) => amount,
        None => return bid.downgrade(RejectionReason::InvalidBidAmount),
    };
    if let Some(currency) = &bid.currency {
        if !currency.eq_ignore_ascii_case(&target.currency) {
            return bid.downgrade(RejectionReason::CurrencyMismatch);
        }
    }

    let floor = call
        .min_bid
        .map_or(target.min_bid_amount, |min| min.max(target.min_bid_amount));
    if amount < floor {
        return bid.downgrade(RejectionReason::BelowMinimumBid);
    }
    if amount > target.max_bid_amount {
        return bid.downgrade(RejectionReason::AboveMaximumBid);
    }

    match bid.destination.clone().or_else(|| target.destination.clone()) {
        Some(destination) => ParsedBid {
            destination: Some(destination),
            ..bid
        },
        None => bid.downgrade(RejectionReason::MissingDestination),
    }
}

/// A bid competing for the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub target_id: &'a str,
    pub amount: Decimal,
    pub response_time_ms: u64,
}

/// `Less` means `a` beats `b`: higher amount, then faster response, then lower target id.
pub fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.amount
        .cmp(&a.amount)
        .then(a.response_time_ms.cmp(&b.response_time_ms))
        .then(a.target_id.cmp(b.target_id))
}

/// Index of the winning entry among the accepted ones. Arrival order plays no role.
pub fn select_winner(entries: &[AuctionEntry]) -> Option<usize> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.bid.accepted)
        .filter_map(|(idx, entry)| {
            entry.bid.bid_amount.map(|amount| {
                (
                    idx,
                    Candidate {
                        target_id: &entry.target.id,
                        amount,
                        response_time_ms: entry.response_time_ms,
                    },
                )
            })
        })
        .min_by(|(_, a), (_, b)| rank(a, b))
        .map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::target::tests::target;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn accepted(amount: Decimal) -> ParsedBid {
        ParsedBid {
            accepted: true,
            bid_amount: Some(amount),
            destination: Some("+18005550100".into()),
            currency: None,
            rejection_reason: None,
        }
    }

    fn entry(id: &str, bid: ParsedBid, response_time_ms: u64) -> AuctionEntry {
        AuctionEntry {
            target: Arc::new(target(id)),
            request: None,
            response: None,
            bid,
            dispatched: true,
            response_time_ms,
        }
    }

    #[test]
    fn test_score_enforces_bounds() {
        let mut t = target("t1");
        t.min_bid_amount = Decimal::new(5, 0);
        t.max_bid_amount = Decimal::new(50, 0);
        let call = CallAttributes::new("+14155550100");

        assert!(score(&t, &call, accepted(Decimal::new(5, 0))).accepted);
        assert!(score(&t, &call, accepted(Decimal::new(50, 0))).accepted);
        assert_eq!(
            score(&t, &call, accepted(Decimal::new(499, 2))).rejection_reason,
            Some(RejectionReason::BelowMinimumBid)
        );
        assert_eq!(
            score(&t, &call, accepted(Decimal::new(5001, 2))).rejection_reason,
            Some(RejectionReason::AboveMaximumBid)
        );
    }

    #[test]
    fn test_score_applies_call_floor() {
        let t = target("t1");
        let mut call = CallAttributes::new("+14155550100");
        call.min_bid = Some(Decimal::new(20, 0));
        let scored = score(&t, &call, accepted(Decimal::new(15, 0)));
        assert_eq!(scored.rejection_reason, Some(RejectionReason::BelowMinimumBid));
        assert_eq!(scored.bid_amount, Some(Decimal::new(15, 0)));
    }

    #[test]
    fn test_score_currency_and_destination() {
        let mut t = target("t1");
        let call = CallAttributes::new("+14155550100");

        let mut eur = accepted(Decimal::ONE);
        eur.currency = Some("EUR".into());
        assert_eq!(score(&t, &call, eur).rejection_reason, Some(RejectionReason::CurrencyMismatch));

        let mut nowhere = accepted(Decimal::ONE);
        nowhere.destination = None;
        assert_eq!(
            score(&t, &call, nowhere.clone()).rejection_reason,
            Some(RejectionReason::MissingDestination)
        );

        t.destination = Some("+18885550123".into());
        let scored = score(&t, &call, nowhere);
        assert!(scored.accepted);
        assert_eq!(scored.destination.as_deref(), Some("+18885550123"));
    }

    #[test]
    fn test_tie_breaks() {
        let amount = Decimal::new(2550, 2);
        let entries = vec![
            entry("a", accepted(amount), 200),
            entry("b", ParsedBid::rejected(RejectionReason::Timeout), 3000),
            entry("c", accepted(amount), 150),
        ];
        assert_eq!(select_winner(&entries), Some(2));

        let same_time = vec![entry("z", accepted(amount), 100), entry("m", accepted(amount), 100)];
        assert_eq!(select_winner(&same_time), Some(1));

        let higher = vec![entry("a", accepted(amount), 10), entry("b", accepted(Decimal::new(2551, 2)), 900)];
        assert_eq!(select_winner(&higher), Some(1));
    }

    #[test]
    fn test_no_accepted_no_winner() {
        let entries = vec![entry("a", ParsedBid::rejected(RejectionReason::ParseError), 5)];
        assert_eq!(select_winner(&entries), None);
        assert_eq!(select_winner(&[]), None);
    }

    proptest! {
        #[test]
        fn prop_winner_is_best_accepted_bid(
            bids in prop::collection::vec((0u32..8, 0i64..6, 0u64..4, any::<bool>()), 1..12)
        ) {
            // small ranges force plenty of exact ties on amount and time
            let entries: Vec<AuctionEntry> = bids
                .iter()
                .map(|(id, cents, ms, ok)| {
                    let bid = if *ok {
                        accepted(Decimal::new(*cents, 1))
                    } else {
                        ParsedBid::rejected(RejectionReason::Declined(None))
                    };
                    entry(&format!("t{}", id), bid, *ms)
                })
                .collect();

            let winner = select_winner(&entries);
            let accepted: Vec<&AuctionEntry> = entries.iter().filter(|e| e.bid.accepted).collect();
            prop_assert_eq!(winner.is_some(), !accepted.is_empty());

            if let Some(idx) = winner {
                let w = &entries[idx];
                prop_assert!(w.bid.accepted);
                for other in accepted {
                    let (wa, oa) = (w.bid.bid_amount.unwrap(), other.bid.bid_amount.unwrap());
                    prop_assert!(wa >= oa);
                    if wa == oa {
                        prop_assert!(w.response_time_ms <= other.response_time_ms);
                        if w.response_time_ms == other.response_time_ms {
                            prop_assert!(w.target.id <= other.target.id);
                        }
                    }
                }
            }
        }

        #[test]
        fn prop_selection_ignores_arrival_order(
            bids in prop::collection::vec((0i64..5, 0u64..3), 1..8)
        ) {
            let entries: Vec<AuctionEntry> = bids
                .iter()
                .enumerate()
                .map(|(i, (cents, ms))| entry(&format!("t{}", i), accepted(Decimal::new(*cents, 0)), *ms))
                .collect();
            let mut reversed = entries.clone();
            reversed.reverse();

            let forward = select_winner(&entries).map(|i| entries[i].target.id.clone());
            let backward = select_winner(&reversed).map(|i| reversed[i].target.id.clone());
            prop_assert_eq!(forward, backward);
        }
    }
}
