// src/bidding/transport.rs

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};
use tokio::time::{timeout, Instant};

use crate::bidding::template::BidRequest;
use crate::error::TransportError;
use crate::model::auction::BidResponse;
use crate::model::target::{AuthMethod, HttpMethod, Target};

const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// Bidder bodies larger than this are refused rather than buffered.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Status, body and content type of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    pub content_type: Option<String>,
}

/// One call, one target. Never retries.
#[async_trait]
pub trait BidTransport: Send + Sync {
    /// The bare network exchange, without any deadline of its own.
    async fn exchange(&self, target: &Target, request: &BidRequest) -> Result<RawResponse, TransportError>;

    /// Availability check used by the health monitor.
    async fn ping(&self, target: &Target) -> Result<RawResponse, TransportError>;

    /// `exchange` bounded by the target's own timeout. A timeout is reported
    /// with the timeout value as response time.
    async fn send(&self, target: &Target, request: &BidRequest) -> BidResponse {
        let started = Instant::now();
        match timeout(target.timeout(), self.exchange(target, request)).await {
            Ok(Ok(raw)) => BidResponse::received(raw.status, raw.body, raw.content_type, elapsed_ms(started)),
            Ok(Err(TransportError::Timeout)) | Err(_) => {
                BidResponse::failed(TransportError::Timeout, target.timeout_ms)
            }
            Ok(Err(err)) => BidResponse::failed(err, elapsed_ms(started)),
        }
    }
}

pub fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// reqwest-backed transport shared by every auction.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn build(&self, target: &Target, request: &BidRequest) -> RequestBuilder {
        let builder = match request.method {
            HttpMethod::Get => self.client.get(with_query(&target.endpoint_url, &request.payload)),
            HttpMethod::Post => self
                .client
                .post(&target.endpoint_url)
                .header(CONTENT_TYPE, request.content_type.mime())
                .body(request.payload.clone()),
        };
        authorize(builder.timeout(target.timeout()), target)
    }
}

#[async_trait]
impl BidTransport for HttpTransport {
    async fn exchange(&self, target: &Target, request: &BidRequest) -> Result<RawResponse, TransportError> {
        let response = self.build(target, request).send().await?;
        read(response).await
    }

    async fn ping(&self, target: &Target) -> Result<RawResponse, TransportError> {
        let builder = self.client.get(target.health_url()).timeout(target.timeout());
        let response = authorize(builder, target).send().await?;
        read(response).await
    }
}

async fn read(mut response: reqwest::Response) -> Result<RawResponse, TransportError> {
    let too_large = TransportError::BodyTooLarge { limit: MAX_BODY_BYTES };
    if response.content_length().map_or(false, |len| len > MAX_BODY_BYTES as u64) {
        return Err(too_large);
    }
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    // chunked bodies carry no length up front, so the limit is enforced while reading
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > MAX_BODY_BYTES {
            return Err(too_large);
        }
        body.extend_from_slice(&chunk);
    }
    Ok(RawResponse {
        status,
        body: String::from_utf8_lossy(&body).into_owned(),
        content_type,
    })
}

fn with_query(url: &str, query: &str) -> String {
    if query.is_empty() {
        url.to_string()
    } else if url.contains('?') {
        format!("{}&{}", url, query)
    } else {
        format!("{}?{}", url, query)
    }
}

fn authorize(builder: RequestBuilder, target: &Target) -> RequestBuilder {
    match (target.auth_method, target.credential.as_deref()) {
        (AuthMethod::Bearer, Some(token)) => builder.bearer_auth(token),
        (AuthMethod::Basic, Some(credential)) => {
            let (user, password) = credential.split_once(':').unwrap_or((credential, ""));
            builder.basic_auth(user, Some(password))
        }
        (AuthMethod::ApiKey, Some(key)) => builder.header(
            target.api_key_header.as_deref().unwrap_or(DEFAULT_API_KEY_HEADER),
            key,
        ),
        _ => builder,
    }
}
