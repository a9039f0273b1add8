// src/bidding/extractor.rs

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::bidding::path::FieldPath;
use crate::error::TransportError;
use crate::model::auction::{BidResponse, ParsedBid, RejectionReason};
use crate::model::target::{ContentType, Target};

/// Deeper documents are rejected before any tree is built.
const MAX_XML_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Xml,
}

enum Amount {
    Missing,
    Invalid,
    Value(Decimal),
}

/// Reads a bidder's answer through the target's extraction rules.
///
/// Pure and total: the same response always yields the same `ParsedBid`, and
/// every failure becomes a rejected bid carrying a reason.
pub fn extract(target: &Target, response: &BidResponse) -> ParsedBid {
    match &response.transport_error {
        Some(TransportError::Timeout) => return ParsedBid::rejected(RejectionReason::Timeout),
        Some(TransportError::ConnectionFailed { .. }) => {
            return ParsedBid::rejected(RejectionReason::ConnectionFailed)
        }
        Some(TransportError::BodyTooLarge { .. }) => {
            return ParsedBid::rejected(RejectionReason::ResponseTooLarge)
        }
        None => {}
    }

    let rules = &target.extraction;
    let status = response.status_code.unwrap_or_default();
    if !(200..300).contains(&status) && !rules.success_statuses.contains(&status) {
        return ParsedBid::rejected(RejectionReason::HttpStatus(status));
    }

    let body = response.body.as_deref().unwrap_or_default();
    let format = detect_format(target, response.content_type.as_deref());
    let Some(document) = parse_document(body, format) else {
        return ParsedBid::rejected(RejectionReason::ParseError);
    };

    let amount = read_amount(rules.bid_amount_path.resolve(&document));
    let destination = read_text(&document, rules.destination_path.as_ref());
    let currency = read_text(&document, rules.currency_path.as_ref()).map(|c| c.to_ascii_uppercase());
    let reason = read_text(&document, rules.rejection_reason_path.as_ref());

    let explicit = rules
        .accepted_path
        .as_ref()
        .and_then(|path| path.resolve(&document))
        .filter(|value| !value.is_null())
        .map(is_truthy);
    let accepted = match explicit {
        Some(flag) => flag,
        None => matches!(amount, Amount::Value(v) if v > Decimal::ZERO),
    };

    let bid = ParsedBid {
        accepted,
        bid_amount: match amount {
            Amount::Value(v) => Some(v),
            _ => None,
        },
        destination,
        currency,
        rejection_reason: None,
    };

    if !accepted {
        return bid.downgrade(RejectionReason::Declined(reason));
    }
    match amount {
        Amount::Value(v) if !v.is_sign_negative() => bid,
        _ => bid.downgrade(RejectionReason::InvalidBidAmount),
    }
}

fn detect_format(target: &Target, content_type: Option<&str>) -> Format {
    match content_type.map(str::to_ascii_lowercase) {
        Some(ct) if ct.contains("xml") => Format::Xml,
        Some(ct) if ct.contains("json") => Format::Json,
        _ if target.content_type == ContentType::Xml => Format::Xml,
        _ => Format::Json,
    }
}

fn parse_document(body: &str, format: Format) -> Option<Value> {
    if body.trim().is_empty() {
        return None;
    }
    match format {
        Format::Json => serde_json::from_str(body).ok(),
        Format::Xml => xml_document(body),
    }
}

fn read_amount(value: Option<&Value>) -> Amount {
    let parsed = match value {
        None | Some(Value::Null) => return Amount::Missing,
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Amount::Missing;
            }
            Decimal::from_str(s.strip_prefix('$').unwrap_or(s)).ok()
        }
        Some(_) => None,
    };
    parsed.map_or(Amount::Invalid, Amount::Value)
}

fn read_text(document: &Value, path: Option<&FieldPath>) -> Option<String> {
    let text = match path?.resolve(document)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "y" | "accepted" | "accept" | "ok" | "1"
        ),
        _ => false,
    }
}

struct Frame {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

/// Converts XML into the same tree shape JSON produces: elements become
/// objects keyed by child name, repeated children become arrays, attributes
/// become `@name` keys and text-only elements become strings.
fn xml_document(body: &str) -> Option<Value> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if stack.len() >= MAX_XML_DEPTH {
                    return None;
                }
                stack.push(open_frame(e)?)
            }
            Ok(Event::Empty(ref e)) => {
                let frame = open_frame(e)?;
                close_frame(frame, &mut stack, &mut root);
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().ok()?;
                stack.last_mut()?.text.push_str(&text);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8(e.into_inner().into_owned()).ok()?;
                stack.last_mut()?.text.push_str(text.trim());
            }
            Ok(Event::End(_)) => {
                let frame = stack.pop()?;
                close_frame(frame, &mut stack, &mut root);
            }
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return None;
    }
    let (name, value) = root?;
    let mut document = Map::new();
    document.insert(name, value);
    Some(Value::Object(document))
}

fn open_frame(element: &BytesStart) -> Option<Frame> {
    let name = String::from_utf8(element.name().as_ref().to_vec()).ok()?;
    let mut fields = Map::new();
    for attr in element.attributes() {
        let attr = attr.ok()?;
        let key = String::from_utf8(attr.key.as_ref().to_vec()).ok()?;
        let value = attr.unescape_value().ok()?.into_owned();
        fields.insert(format!("@{}", key), Value::String(value));
    }
    Some(Frame {
        name,
        fields,
        text: String::new(),
    })
}

fn close_frame(frame: Frame, stack: &mut [Frame], root: &mut Option<(String, Value)>) {
    let Frame { name, mut fields, text } = frame;
    let value = if fields.is_empty() {
        if text.is_empty() {
            Value::Null
        } else {
            Value::String(text)
        }
    } else {
        if !text.is_empty() {
            fields.insert("#text".to_string(), Value::String(text));
        }
        Value::Object(fields)
    };

    match stack.last_mut() {
        Some(parent) => match parent.fields.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                parent.fields.insert(name, value);
            }
        },
        None => {
            if root.is_none() {
                *root = Some((name, value));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::target::tests::target;
    use crate::model::target::ExtractionRules;

    fn ok(body: &str) -> BidResponse {
        BidResponse::received(200, body.to_string(), Some("application/json".into()), 40)
    }

    fn amount(s: &str) -> Option<Decimal> {
        Some(Decimal::from_str(s).unwrap())
    }

    #[test]
    fn test_accepted_json_bid() {
        let bid = extract(
            &target("t1"),
            &ok(r#"{"accepted": true, "bid": 25.50, "destination": "+18005550199", "currency": "usd"}"#),
        );
        assert!(bid.accepted);
        assert_eq!(bid.bid_amount, amount("25.50"));
        assert_eq!(bid.destination.as_deref(), Some("+18005550199"));
        assert_eq!(bid.currency.as_deref(), Some("USD"));
        assert_eq!(bid.rejection_reason, None);
    }

    #[test]
    fn test_declined_keeps_reason() {
        let bid = extract(&target("t1"), &ok(r#"{"accepted": false, "reason": "no capacity"}"#));
        assert!(!bid.accepted);
        assert_eq!(bid.rejection_reason, Some(RejectionReason::Declined(Some("no capacity".into()))));
    }

    #[test]
    fn test_accepted_without_amount_is_invalid() {
        let bid = extract(&target("t1"), &ok(r#"{"accepted": "yes", "bid": "lots"}"#));
        assert!(!bid.accepted);
        assert_eq!(bid.rejection_reason, Some(RejectionReason::InvalidBidAmount));

        let bid = extract(&target("t1"), &ok(r#"{"accepted": true}"#));
        assert_eq!(bid.rejection_reason, Some(RejectionReason::InvalidBidAmount));

        let bid = extract(&target("t1"), &ok(r#"{"accepted": true, "bid": -3}"#));
        assert_eq!(bid.rejection_reason, Some(RejectionReason::InvalidBidAmount));
    }

    #[test]
    fn test_malformed_body_is_parse_error() {
        for body in ["<html>oops", "not json at all", "", "{\"bid\": "] {
            let bid = extract(&target("t1"), &ok(body));
            assert!(!bid.accepted);
            assert_eq!(bid.rejection_reason, Some(RejectionReason::ParseError), "body {:?}", body);
        }
    }

    #[test]
    fn test_non_2xx_is_rejected_unless_listed() {
        let mut t = target("t1");
        let resp = BidResponse::received(409, r#"{"accepted": true, "bid": 5}"#.into(), None, 10);
        assert_eq!(extract(&t, &resp).rejection_reason, Some(RejectionReason::HttpStatus(409)));

        let resp500 = BidResponse::received(500, "{}".into(), None, 10);
        assert_eq!(extract(&t, &resp500).rejection_reason, Some(RejectionReason::HttpStatus(500)));

        t.extraction.success_statuses = vec![409];
        assert!(extract(&t, &resp).accepted);
    }

    #[test]
    fn test_transport_failures_map_to_reasons() {
        let t = target("t1");
        let timed_out = BidResponse::failed(TransportError::Timeout, 1000);
        let bid = extract(&t, &timed_out);
        assert!(!bid.accepted);
        assert_eq!(bid.rejection_reason, Some(RejectionReason::Timeout));

        let refused = BidResponse::failed(TransportError::ConnectionFailed { cause: "refused".into() }, 3);
        assert_eq!(extract(&t, &refused).rejection_reason, Some(RejectionReason::ConnectionFailed));
    }

    #[test]
    fn test_amount_inference_without_accept_path() {
        let mut t = target("t1");
        t.extraction = ExtractionRules {
            accepted_path: None,
            bid_amount_path: FieldPath::parse("$.data.offers[0].price").unwrap(),
            destination_path: Some(FieldPath::parse("data.offers[0].number").unwrap()),
            ..ExtractionRules::default()
        };
        let bid = extract(&t, &ok(r#"{"data": {"offers": [{"price": "$12.75", "number": 18005550100}]}}"#));
        assert!(bid.accepted);
        assert_eq!(bid.bid_amount, amount("12.75"));
        assert_eq!(bid.destination.as_deref(), Some("18005550100"));

        let zero = extract(&t, &ok(r#"{"data": {"offers": [{"price": 0}]}}"#));
        assert!(!zero.accepted);
        assert_eq!(zero.rejection_reason, Some(RejectionReason::Declined(None)));
    }

    #[test]
    fn test_xml_response() {
        let mut t = target("t1");
        t.content_type = ContentType::Xml;
        t.extraction = ExtractionRules {
            accepted_path: Some(FieldPath::parse("response.@status").unwrap()),
            bid_amount_path: FieldPath::parse("response.bid.amount").unwrap(),
            destination_path: Some(FieldPath::parse("response.bid.sip").unwrap()),
            ..ExtractionRules::default()
        };
        let body = r#"<?xml version="1.0"?>
            <response status="accepted">
              <bid><amount>18.40</amount><sip><![CDATA[sip:buyer@example.com]]></sip></bid>
            </response>"#;
        let resp = BidResponse::received(200, body.into(), Some("text/xml".into()), 80);
        let bid = extract(&t, &resp);
        assert!(bid.accepted);
        assert_eq!(bid.bid_amount, amount("18.40"));
        assert_eq!(bid.destination.as_deref(), Some("sip:buyer@example.com"));
    }

    #[test]
    fn test_xml_repeated_children_become_arrays() {
        let doc = xml_document("<r><b>1</b><b>2</b><c x=\"y\">t</c></r>").unwrap();
        assert_eq!(doc["r"]["b"], serde_json::json!(["1", "2"]));
        assert_eq!(doc["r"]["c"]["@x"], "y");
        assert_eq!(doc["r"]["c"]["#text"], "t");
        assert!(xml_document("<r><b>1</r>").is_none());
        assert!(xml_document("<r>").is_none());
    }

    #[test]
    fn test_deeply_nested_xml_is_parse_error() {
        let mut t = target("t1");
        t.content_type = ContentType::Xml;
        let body = "<a>".repeat(200_000) + &"</a>".repeat(200_000);
        let resp = BidResponse::received(200, body, Some("application/xml".into()), 5);
        let bid = extract(&t, &resp);
        assert!(!bid.accepted);
        assert_eq!(bid.rejection_reason, Some(RejectionReason::ParseError));

        let at_limit = "<a>".repeat(MAX_XML_DEPTH) + &"</a>".repeat(MAX_XML_DEPTH);
        assert!(xml_document(&at_limit).is_some());
        let past_limit = "<a>".repeat(MAX_XML_DEPTH + 1) + &"</a>".repeat(MAX_XML_DEPTH + 1);
        assert!(xml_document(&past_limit).is_none());
    }

    #[test]
    fn test_oversized_body_maps_to_reason() {
        let resp = BidResponse::failed(TransportError::BodyTooLarge { limit: 65_536 }, 40);
        assert_eq!(
            extract(&target("t1"), &resp).rejection_reason,
            Some(RejectionReason::ResponseTooLarge)
        );
    }

    #[test]
    fn test_extract_is_idempotent() {
        let t = target("t1");
        for body in [r#"{"accepted":true,"bid":9.99,"destination":"+1800"}"#, "garbage", r#"{"accepted":false}"#] {
            let resp = ok(body);
            assert_eq!(extract(&t, &resp), extract(&t, &resp));
        }
    }
}
