#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use call_rtb::bidding::engine::AuctionEngine;
use call_rtb::bidding::template::BidRequest;
use call_rtb::bidding::transport::{BidTransport, RawResponse};
use call_rtb::config::ConfigManager;
use call_rtb::error::TransportError;
use call_rtb::logging::ledger::{AuctionLedger, MemoryLedger};
use call_rtb::model::campaign::Campaign;
use call_rtb::model::target::Target;

pub const CAMPAIGN: &str = "camp-1";

/// A target on `CAMPAIGN` with a fallback destination and default extraction rules.
pub fn target(id: &str, timeout_ms: u64) -> Target {
    serde_json::from_value(json!({
        "id": id,
        "name": format!("{} buyer", id),
        "campaignId": CAMPAIGN,
        "endpointUrl": format!("http://bidder.test/{}", id),
        "timeoutMs": timeout_ms,
        "minBidAmount": 0,
        "maxBidAmount": 100,
        "destination": format!("+1800555{:0>4}", id.len()),
    }))
    .unwrap()
}

#[derive(Clone, Debug)]
pub enum Script {
    /// Answers with `status` and `body` after `after_ms`.
    Reply {
        after_ms: u64,
        status: u16,
        body: &'static str,
    },
    /// Fails to connect after `after_ms`.
    Refuse { after_ms: u64 },
}

pub fn accept(after_ms: u64, body: &'static str) -> Script {
    Script::Reply {
        after_ms,
        status: 200,
        body,
    }
}

/// In-process bidder network. Each target id is bound to a script; the
/// clock is tokio's, so paused-time tests are exact.
#[derive(Default)]
pub struct FakeTransport {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new(scripts: impl IntoIterator<Item = (&'static str, Script)>) -> Self {
        Self {
            scripts: scripts.into_iter().map(|(id, s)| (id.to_string(), s)).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().clone();
        calls.sort();
        calls
    }
}

#[async_trait]
impl BidTransport for FakeTransport {
    async fn exchange(&self, target: &Target, _request: &BidRequest) -> Result<RawResponse, TransportError> {
        self.calls.lock().push(target.id.clone());
        match self.scripts.get(&target.id).cloned() {
            Some(Script::Reply { after_ms, status, body }) => {
                tokio::time::sleep(Duration::from_millis(after_ms)).await;
                Ok(RawResponse {
                    status,
                    body: body.to_string(),
                    content_type: Some("application/json".to_string()),
                })
            }
            Some(Script::Refuse { after_ms }) => {
                tokio::time::sleep(Duration::from_millis(after_ms)).await;
                Err(TransportError::ConnectionFailed {
                    cause: "connection refused".to_string(),
                })
            }
            None => Err(TransportError::ConnectionFailed {
                cause: "no script".to_string(),
            }),
        }
    }

    async fn ping(&self, _target: &Target) -> Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status: 200,
            body: String::new(),
            content_type: None,
        })
    }
}

pub struct Harness {
    pub engine: AuctionEngine,
    pub config: Arc<ConfigManager>,
    pub transport: Arc<FakeTransport>,
    pub ledger: Arc<MemoryLedger>,
}

pub fn harness(campaign: Campaign, targets: Vec<Target>, transport: FakeTransport) -> Harness {
    harness_with_in_flight(campaign, targets, transport, 64)
}

pub fn harness_with_in_flight(
    campaign: Campaign,
    targets: Vec<Target>,
    transport: FakeTransport,
    max_in_flight: usize,
) -> Harness {
    let ledger = Arc::new(MemoryLedger::new());
    build(campaign, targets, transport, ledger.clone(), ledger, max_in_flight)
}

pub fn harness_with_ledger(
    campaign: Campaign,
    targets: Vec<Target>,
    transport: FakeTransport,
    ledger: Arc<dyn AuctionLedger>,
    memory: Arc<MemoryLedger>,
) -> Harness {
    build(campaign, targets, transport, ledger, memory, 64)
}

fn build(
    campaign: Campaign,
    targets: Vec<Target>,
    transport: FakeTransport,
    ledger: Arc<dyn AuctionLedger>,
    memory: Arc<MemoryLedger>,
    max_in_flight: usize,
) -> Harness {
    let config = Arc::new(ConfigManager::new());
    config.reload(targets, vec![campaign]);
    let transport = Arc::new(transport);
    let engine = AuctionEngine::new(config.clone(), transport.clone(), ledger, max_in_flight);
    Harness {
        engine,
        config,
        transport,
        ledger: memory,
    }
}
