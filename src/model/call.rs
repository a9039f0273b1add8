// src/model/call.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Attributes of the inbound call, as handed over by the call router.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CallAttributes {
    pub caller_id: String,
    #[serde(default)]
    pub caller_state: Option<String>,
    #[serde(default)]
    pub caller_zip: Option<String>,
    #[serde(default)]
    pub caller_area_code: Option<String>,
    #[serde(default)]
    pub min_bid: Option<Decimal>,
    #[serde(default)]
    pub max_bid: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default = "Utc::now")]
    pub call_start_time: DateTime<Utc>,
}

impl CallAttributes {
    pub fn new(caller_id: &str) -> Self {
        Self {
            caller_id: caller_id.to_string(),
            caller_state: None,
            caller_zip: None,
            caller_area_code: None,
            min_bid: None,
            max_bid: None,
            currency: None,
            call_start_time: Utc::now(),
        }
    }

    pub fn state(&self) -> Option<String> {
        self.caller_state
            .as_deref()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
    }

    /// Five digit zip; ZIP+4 suffixes are dropped.
    pub fn zip(&self) -> Option<String> {
        self.caller_zip
            .as_deref()
            .map(|z| z.trim().chars().take(5).collect::<String>())
            .filter(|z| !z.is_empty())
    }

    /// The explicit area code, or the one implied by a NANP caller id.
    pub fn area_code(&self) -> Option<String> {
        if let Some(code) = self.caller_area_code.as_deref().map(str::trim) {
            if !code.is_empty() {
                return Some(code.to_string());
            }
        }
        let digits: String = self.caller_id.chars().filter(|c| c.is_ascii_digit()).collect();
        let national = match digits.len() {
            11 if digits.starts_with('1') => &digits[1..],
            10 => digits.as_str(),
            _ => return None,
        };
        Some(national[..3].to_string())
    }

    pub fn masked_caller_id(&self) -> String {
        mask_caller_id(&self.caller_id)
    }
}

/// Keeps the first two and last four characters visible: `+15551234567` -> `+1******4567`.
pub fn mask_caller_id(caller_id: &str) -> String {
    let chars: Vec<char> = caller_id.chars().collect();
    if chars.len() <= 6 {
        return "*".repeat(chars.len());
    }
    let hidden = chars.len() - 6;
    let mut masked: String = chars[..2].iter().collect();
    masked.push_str(&"*".repeat(hidden));
    masked.extend(&chars[chars.len() - 4..]);
    masked
}

/// Masks every spelling of `caller_id` found in `text`: as given, digits
/// only, and without the US country code. Bidders echo the number back in
/// whatever format they store it.
pub fn redact_caller_id(text: &str, caller_id: &str) -> String {
    let digits: String = caller_id.chars().filter(char::is_ascii_digit).collect();
    let mut spellings = vec![caller_id.to_string()];
    if digits.len() == 11 && digits.starts_with('1') {
        spellings.push(digits[1..].to_string());
    }
    spellings.push(digits);
    // short fragments would mask unrelated numbers
    spellings.retain(|s| s.chars().count() > 6);
    spellings.sort_by(|a, b| b.len().cmp(&a.len()));
    spellings.dedup();

    let mut redacted = text.to_string();
    for spelling in &spellings {
        if redacted.contains(spelling.as_str()) {
            redacted = redacted.replace(spelling.as_str(), &mask_caller_id(spelling));
        }
    }
    redacted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_caller_id() {
        assert_eq!(mask_caller_id("+15551234567"), "+1******4567");
        assert_eq!(mask_caller_id("5551234"), "55*1234");
        assert_eq!(mask_caller_id("1234"), "****");
        assert_eq!(mask_caller_id(""), "");
    }

    #[test]
    fn test_redact_caller_id_in_any_spelling() {
        let body = r#"{"accepted":true,"ani":"+14155550100","callback":"4155550100","raw":"14155550100"}"#;
        let redacted = redact_caller_id(body, "+14155550100");
        assert!(!redacted.contains("4155550100"));
        assert!(redacted.contains(r#""ani":"+1******0100""#));
        assert!(redacted.contains(r#""callback":"41****0100""#));

        assert_eq!(redact_caller_id("bid 12.50", "+14155550100"), "bid 12.50");
        // nothing long enough to match safely
        assert_eq!(redact_caller_id("ref 1234", "1234"), "ref 1234");
    }

    #[test]
    fn test_area_code_derived_from_caller_id() {
        assert_eq!(CallAttributes::new("+1 (415) 555-0100").area_code().as_deref(), Some("415"));
        assert_eq!(CallAttributes::new("2125550100").area_code().as_deref(), Some("212"));
        assert_eq!(CallAttributes::new("+44 20 7946 0958").area_code(), None);

        let mut call = CallAttributes::new("+14155550100");
        call.caller_area_code = Some("650".into());
        assert_eq!(call.area_code().as_deref(), Some("650"));
    }

    #[test]
    fn test_state_and_zip_normalised() {
        let mut call = CallAttributes::new("+14155550100");
        call.caller_state = Some(" ca ".into());
        call.caller_zip = Some("94105-1234".into());
        assert_eq!(call.state().as_deref(), Some("CA"));
        assert_eq!(call.zip().as_deref(), Some("94105"));
    }
}
