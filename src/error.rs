// src/error.rs

use thiserror::Error;

/// Rejected at registration time; an invalid target never reaches an auction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("target {id}: {reason}")]
    InvalidTarget { id: String, reason: String },
    #[error("campaign {id}: {reason}")]
    InvalidCampaign { id: String, reason: String },
    #[error("target {id}: invalid request template: {source}")]
    InvalidTemplate {
        id: String,
        #[source]
        source: TemplateError,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("rendered body is not valid JSON: {0}")]
    MalformedJson(String),
    #[error("rendered body is not valid XML: {0}")]
    MalformedXml(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("bid request timed out")]
    Timeout,
    #[error("connection failed: {cause}")]
    ConnectionFailed { cause: String },
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return TransportError::Timeout;
        }
        // reqwest hides the interesting part (dns, tls, refused) in the source chain
        let mut cause = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            cause.push_str(": ");
            cause.push_str(&inner.to_string());
            source = inner.source();
        }
        TransportError::ConnectionFailed { cause }
    }
}

/// Failures that prevent an auction from running at all.
///
/// `Unavailable` is for registries backed by an external store that cannot
/// be reached; the in-memory `ConfigManager` never returns it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown campaign {0}")]
    UnknownCampaign(String),
    #[error("campaign {0} is not active")]
    InactiveCampaign(String),
    #[error("target registry unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger queue is full, auction {0} dropped")]
    Backpressure(String),
    #[error("ledger writer has shut down")]
    Closed,
    #[error("failed to encode auction record: {0}")]
    Encode(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("illegal auction transition {from} -> {to}")]
pub struct StateError {
    pub from: &'static str,
    pub to: &'static str,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuctionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    State(#[from] StateError),
}
