// src/bidding/path.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::TryFrom;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A JSON-path-like locator such as `$.result.bids[0].amount`.
///
/// Accepted syntax: an optional `$` / `$.` prefix, dotted keys, `[n]` indexes
/// and quoted keys (`['a key']`). XML attributes are plain keys named `@attr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn key(name: &str) -> Self {
        Self {
            segments: vec![Segment::Key(name.to_string())],
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        let rest = trimmed.strip_prefix('$').unwrap_or(trimmed);
        let rest = rest.strip_prefix('.').unwrap_or(rest);

        let mut segments = Vec::new();
        let mut chars = rest.chars().peekable();
        let mut key = String::new();
        // set after `]` so that `a[0].b` does not see an empty key before `.b`
        let mut after_bracket = false;

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if key.is_empty() && !after_bracket {
                        return Err(format!("empty key in path {}", raw));
                    }
                    if !key.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut key)));
                    }
                    after_bracket = false;
                }
                '[' => {
                    if !key.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut key)));
                    }
                    let mut inner = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == ']' {
                            closed = true;
                            break;
                        }
                        inner.push(c);
                    }
                    if !closed {
                        return Err(format!("unterminated [ in path {}", raw));
                    }
                    let inner = inner.trim();
                    let quoted = inner
                        .strip_prefix('\'')
                        .and_then(|s| s.strip_suffix('\''))
                        .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')));
                    match quoted {
                        Some(name) => segments.push(Segment::Key(name.to_string())),
                        None => {
                            let idx = inner
                                .parse::<usize>()
                                .map_err(|_| format!("invalid index [{}] in path {}", inner, raw))?;
                            segments.push(Segment::Index(idx));
                        }
                    }
                    after_bracket = true;
                }
                _ => {
                    if after_bracket {
                        return Err(format!("expected . or [ after ] in path {}", raw));
                    }
                    key.push(c);
                }
            }
        }
        if !key.is_empty() {
            segments.push(Segment::Key(key));
        } else if rest.ends_with('.') {
            return Err(format!("trailing . in path {}", raw));
        }

        Ok(Self { segments })
    }

    /// Walks the document. A missing step yields `None`, never an error.
    ///
    /// `[0]` on a non-array selects the value itself: an XML element that
    /// occurs once is not wrapped in an array.
    pub fn resolve<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        let mut current = document;
        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Key(key), Value::Object(map)) => map.get(key)?,
                (Segment::Index(idx), Value::Array(items)) => items.get(*idx)?,
                (Segment::Index(0), other) => other,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FieldPath::parse(&value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("$");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if key.contains(['.', '[', ']']) => write!(f, "['{}']", key)?,
                Segment::Key(key) if i == 0 => f.write_str(key)?,
                Segment::Key(key) => write!(f, ".{}", key)?,
                Segment::Index(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}
