// src/model/target.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::bidding::path::FieldPath;
use crate::bidding::template;
use crate::error::ConfigError;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// "ping": the rendered template travels as the query string
    Get,
    /// "post": the rendered template is the request body
    #[default]
    Post,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    #[serde(rename = "application/json")]
    Json,
    #[serde(rename = "application/xml")]
    Xml,
    #[serde(rename = "application/x-www-form-urlencoded")]
    Form,
}

impl ContentType {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::Xml => "application/xml",
            ContentType::Form => "application/x-www-form-urlencoded",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum AuthMethod {
    #[default]
    None,
    Bearer,
    /// credential is `user:password`
    Basic,
    ApiKey,
}

/// Where each field of a bidder's answer lives in its response document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractionRules {
    /// Absent: a positive bid amount alone means the bid is accepted.
    pub accepted_path: Option<FieldPath>,
    pub bid_amount_path: FieldPath,
    pub destination_path: Option<FieldPath>,
    pub currency_path: Option<FieldPath>,
    pub rejection_reason_path: Option<FieldPath>,
    /// Non-2xx statuses whose body is still interpreted as a bid.
    pub success_statuses: Vec<u16>,
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self {
            accepted_path: Some(FieldPath::key("accepted")),
            bid_amount_path: FieldPath::key("bid"),
            destination_path: Some(FieldPath::key("destination")),
            currency_path: Some(FieldPath::key("currency")),
            rejection_reason_path: Some(FieldPath::key("reason")),
            success_statuses: Vec::new(),
        }
    }
}

/// A bidding endpoint and everything needed to decide whether, and how, to call it.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: String,
    pub name: String,
    /// Owning campaign; only that campaign's auctions consider this target.
    pub campaign_id: String,
    /// Lower sorts first.
    #[serde(default)]
    pub priority: u32,

    pub endpoint_url: String,
    #[serde(default)]
    pub http_method: HttpMethod,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub auth_method: AuthMethod,
    #[serde(default)]
    pub credential: Option<String>,
    /// Header used for `apiKey` auth, `X-API-Key` when unset.
    #[serde(default)]
    pub api_key_header: Option<String>,
    pub timeout_ms: u64,
    #[serde(default)]
    pub max_concurrency: Option<u32>,
    #[serde(default)]
    pub health_check_url: Option<String>,

    pub min_bid_amount: Decimal,
    pub max_bid_amount: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub states: Vec<String>,
    #[serde(default)]
    pub excluded_states: Vec<String>,
    #[serde(default)]
    pub zip_codes: Vec<String>,
    #[serde(default)]
    pub excluded_zip_codes: Vec<String>,
    #[serde(default)]
    pub area_codes: Vec<String>,
    #[serde(default)]
    pub excluded_area_codes: Vec<String>,

    /// Used when an accepted bid names no destination of its own.
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub request_template: Option<String>,
    #[serde(default)]
    pub extraction: ExtractionRules,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_active() -> bool {
    true
}

impl Target {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn health_url(&self) -> &str {
        self.health_check_url.as_deref().unwrap_or(&self.endpoint_url)
    }

    /// Checks every invariant a target must hold before it may be registered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidTarget {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.campaign_id.trim().is_empty() {
            return Err(invalid("campaignId must not be empty"));
        }
        match Url::parse(&self.endpoint_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => return Err(invalid(&format!("unsupported scheme {}", url.scheme()))),
            Err(e) => return Err(invalid(&format!("invalid endpointUrl: {}", e))),
        }
        if let Some(health) = &self.health_check_url {
            Url::parse(health).map_err(|e| invalid(&format!("invalid healthCheckUrl: {}", e)))?;
        }
        if self.timeout_ms == 0 {
            return Err(invalid("timeoutMs must be greater than zero"));
        }
        if self.min_bid_amount.is_sign_negative() {
            return Err(invalid("minBidAmount must not be negative"));
        }
        if self.min_bid_amount > self.max_bid_amount {
            return Err(invalid("minBidAmount must not exceed maxBidAmount"));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid("currency must be a three letter code"));
        }
        if self.max_concurrency == Some(0) {
            return Err(invalid("maxConcurrency must be at least 1 when set"));
        }
        match (self.auth_method, self.credential.as_deref()) {
            (AuthMethod::None, _) => {}
            (_, None) | (_, Some("")) => return Err(invalid("authMethod requires a credential")),
            (AuthMethod::Basic, Some(c)) if !c.contains(':') => {
                return Err(invalid("basic credential must be user:password"))
            }
            _ => {}
        }

        template::check(self).map_err(|source| ConfigError::InvalidTemplate {
            id: self.id.clone(),
            source,
        })
    }
}
