// src/bidding/template.rs

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::TemplateError;
use crate::model::call::{mask_caller_id, CallAttributes};
use crate::model::target::{ContentType, HttpMethod, Target};

const DEFAULT_JSON_TEMPLATE: &str = r#"{"requestId":"{requestId}","campaignId":"{campaignId}","callerId":"{callerId}","callerState":"{callerState}","callerZip":"{callerZip}","callerAreaCode":"{callerAreaCode}","callStartTime":"{callStartTime}","minBid":{minBid},"maxBid":{maxBid},"currency":"{currency}"}"#;

const DEFAULT_XML_TEMPLATE: &str = "<bidRequest><requestId>{requestId}</requestId><campaignId>{campaignId}</campaignId><callerId>{callerId}</callerId><callerState>{callerState}</callerState><callerZip>{callerZip}</callerZip><callerAreaCode>{callerAreaCode}</callerAreaCode><callStartTime>{callStartTime}</callStartTime><minBid>{minBid}</minBid><maxBid>{maxBid}</maxBid><currency>{currency}</currency></bidRequest>";

const DEFAULT_QUERY_TEMPLATE: &str = "requestId={requestId}&campaignId={campaignId}&callerId={callerId}&callerState={callerState}&callerZip={callerZip}&callerAreaCode={callerAreaCode}&callStartTime={callStartTime}&minBid={minBid}&maxBid={maxBid}&currency={currency}";

/// The closed set of placeholders a request template may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateVariable {
    RequestId,
    CampaignId,
    CallerId,
    CallStartTime,
    MinBid,
    MaxBid,
    Currency,
    CallerState,
    CallerZip,
    CallerAreaCode,
    TargetId,
    Timestamp,
}

impl TemplateVariable {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "requestId" => TemplateVariable::RequestId,
            "campaignId" => TemplateVariable::CampaignId,
            "callerId" => TemplateVariable::CallerId,
            "callStartTime" => TemplateVariable::CallStartTime,
            "minBid" => TemplateVariable::MinBid,
            "maxBid" => TemplateVariable::MaxBid,
            "currency" => TemplateVariable::Currency,
            "callerState" => TemplateVariable::CallerState,
            "callerZip" => TemplateVariable::CallerZip,
            "callerAreaCode" => TemplateVariable::CallerAreaCode,
            "targetId" => TemplateVariable::TargetId,
            "timestamp" => TemplateVariable::Timestamp,
            _ => return None,
        })
    }
}

/// Auction-wide inputs shared by every target's request.
#[derive(Debug, Clone)]
pub struct AuctionContext {
    pub auction_id: Uuid,
    pub campaign_id: String,
    pub call: CallAttributes,
}

/// Variable bindings for one target in one auction.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidBindings {
    pub request_id: String,
    pub campaign_id: String,
    pub target_id: String,
    pub caller_id: String,
    pub caller_state: Option<String>,
    pub caller_zip: Option<String>,
    pub caller_area_code: Option<String>,
    pub call_start_time: DateTime<Utc>,
    pub min_bid: Decimal,
    pub max_bid: Decimal,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
}

impl BidBindings {
    pub fn new(target: &Target, ctx: &AuctionContext) -> Self {
        let call = &ctx.call;
        let min_bid = call
            .min_bid
            .map_or(target.min_bid_amount, |floor| floor.max(target.min_bid_amount));
        let max_bid = call
            .max_bid
            .map_or(target.max_bid_amount, |cap| cap.min(target.max_bid_amount));
        Self {
            request_id: format!("{}-{}", ctx.auction_id.simple(), target.id),
            campaign_id: ctx.campaign_id.clone(),
            target_id: target.id.clone(),
            caller_id: call.caller_id.clone(),
            caller_state: call.state(),
            caller_zip: call.zip(),
            caller_area_code: call.area_code(),
            call_start_time: call.call_start_time,
            min_bid,
            max_bid,
            currency: target.currency.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn value(&self, var: TemplateVariable) -> String {
        match var {
            TemplateVariable::RequestId => self.request_id.clone(),
            TemplateVariable::CampaignId => self.campaign_id.clone(),
            TemplateVariable::CallerId => self.caller_id.clone(),
            TemplateVariable::CallStartTime => self.call_start_time.to_rfc3339_opts(SecondsFormat::Millis, true),
            TemplateVariable::MinBid => self.min_bid.normalize().to_string(),
            TemplateVariable::MaxBid => self.max_bid.normalize().to_string(),
            TemplateVariable::Currency => self.currency.clone(),
            TemplateVariable::CallerState => self.caller_state.clone().unwrap_or_default(),
            TemplateVariable::CallerZip => self.caller_zip.clone().unwrap_or_default(),
            TemplateVariable::CallerAreaCode => self.caller_area_code.clone().unwrap_or_default(),
            TemplateVariable::TargetId => self.target_id.clone(),
            TemplateVariable::Timestamp => self.timestamp.timestamp_millis().to_string(),
        }
    }

    /// Copy safe to persist: the caller id is partially hidden.
    pub fn masked(&self) -> Self {
        Self {
            caller_id: mask_caller_id(&self.caller_id),
            ..self.clone()
        }
    }
}

/// One rendered request for one target. Immutable once built.
#[derive(Debug, Clone)]
pub struct BidRequest {
    pub auction_id: Uuid,
    pub target_id: String,
    pub method: HttpMethod,
    pub content_type: ContentType,
    /// Body for POST, query string for GET.
    pub payload: String,
    pub bindings: BidBindings,
    /// Placeholders the template used but nobody could resolve.
    pub warnings: Vec<String>,
}

pub fn build(target: &Target, ctx: &AuctionContext) -> Result<BidRequest, TemplateError> {
    let bindings = BidBindings::new(target, ctx);
    let (payload, warnings) = render_for(target, &bindings)?;
    for warning in &warnings {
        warn!(
            auction_id = %ctx.auction_id,
            target_id = %target.id,
            caller_id = %mask_caller_id(&bindings.caller_id),
            "{}", warning
        );
    }
    Ok(BidRequest {
        auction_id: ctx.auction_id,
        target_id: target.id.clone(),
        method: target.http_method,
        content_type: target.content_type,
        payload,
        bindings,
        warnings,
    })
}

/// Renders the target's template against sample values; used at registration.
pub fn check(target: &Target) -> Result<(), TemplateError> {
    let ctx = AuctionContext {
        auction_id: Uuid::nil(),
        campaign_id: target.campaign_id.clone(),
        call: CallAttributes::new("+15555550100"),
    };
    render_for(target, &BidBindings::new(target, &ctx)).map(|_| ())
}

fn render_for(target: &Target, bindings: &BidBindings) -> Result<(String, Vec<String>), TemplateError> {
    let template = match (&target.request_template, target.http_method, target.content_type) {
        (Some(custom), _, _) => custom.as_str(),
        (None, HttpMethod::Get, _) | (None, HttpMethod::Post, ContentType::Form) => DEFAULT_QUERY_TEMPLATE,
        (None, HttpMethod::Post, ContentType::Json) => DEFAULT_JSON_TEMPLATE,
        (None, HttpMethod::Post, ContentType::Xml) => DEFAULT_XML_TEMPLATE,
    };
    // a GET carries the template in the query string whatever the declared body type
    let encoding = match target.http_method {
        HttpMethod::Get => ContentType::Form,
        HttpMethod::Post => target.content_type,
    };

    let (rendered, warnings) = render(template, bindings, encoding);
    validate_structure(&rendered, encoding)?;
    Ok((rendered, warnings))
}

/// Substitutes known `{placeholders}`; unknown ones are left as-is and reported.
pub fn render(template: &str, bindings: &BidBindings, encoding: ContentType) -> (String, Vec<String>) {
    let mut out = String::with_capacity(template.len() + 64);
    let mut warnings = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) if is_placeholder_name(&after[..end]) => {
                let name = &after[..end];
                match TemplateVariable::from_name(name) {
                    Some(var) => out.push_str(&escape(&bindings.value(var), encoding)),
                    None => {
                        out.push_str(&rest[start..start + end + 2]);
                        warnings.push(format!("unknown placeholder {{{}}} left unreplaced", name));
                    }
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    (out, warnings)
}

fn is_placeholder_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn escape(value: &str, encoding: ContentType) -> String {
    match encoding {
        ContentType::Json => {
            let quoted = serde_json::Value::String(value.to_string()).to_string();
            quoted[1..quoted.len() - 1].to_string()
        }
        ContentType::Xml => quick_xml::escape::escape(value).into_owned(),
        ContentType::Form => url::form_urlencoded::byte_serialize(value.as_bytes()).collect(),
    }
}

fn validate_structure(rendered: &str, encoding: ContentType) -> Result<(), TemplateError> {
    match encoding {
        ContentType::Json => serde_json::from_str::<serde_json::Value>(rendered)
            .map(|_| ())
            .map_err(|e| TemplateError::MalformedJson(e.to_string())),
        ContentType::Xml => {
            let mut reader = Reader::from_str(rendered);
            let mut depth = 0usize;
            loop {
                match reader.read_event() {
                    Ok(Event::Start(_)) => depth += 1,
                    Ok(Event::End(_)) => depth = depth.saturating_sub(1),
                    Ok(Event::Eof) if depth == 0 => return Ok(()),
                    Ok(Event::Eof) => return Err(TemplateError::MalformedXml("unclosed element".to_string())),
                    Err(e) => return Err(TemplateError::MalformedXml(e.to_string())),
                    _ => {}
                }
            }
        }
        ContentType::Form => Ok(()),
    }
}
