// Decoding of ajax response bodies into a typed payload
use crate::common::errors::PollError;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Keys probed on an object payload, in the order given by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKey {
    Message,
    PingReplies,
    Info,
    Warn,
    Warning,
    Error,
}

impl PayloadKey {
    pub const DEFAULT_ORDER: [PayloadKey; 6] = [
        PayloadKey::Message,
        PayloadKey::PingReplies,
        PayloadKey::Info,
        PayloadKey::Warn,
        PayloadKey::Warning,
        PayloadKey::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKey::Message => "message",
            PayloadKey::PingReplies => "ping replies",
            PayloadKey::Info => "info",
            PayloadKey::Warn => "warn",
            PayloadKey::Warning => "warning",
            PayloadKey::Error => "error",
        }
    }
}

impl fmt::Display for PayloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayloadKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        PayloadKey::DEFAULT_ORDER
            .iter()
            .copied()
            .find(|k| k.as_str() == key)
            .ok_or_else(|| format!("unknown payload key: {}", s.trim()))
    }
}

/// One counted range, e.g. `{"from":1,"to":10,"number-of-primes":4}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub from: Value,
    pub to: Value,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    Message(String),
    PingReplies(Vec<String>),
    Info(String),
    Warning(String),
    ErrorMsg(String),
    ResultRows(Vec<Vec<ResultRow>>),
}

impl ResponsePayload {
    /// Total number of rows carried, zero for message-like payloads.
    pub fn row_count(&self) -> usize {
        match self {
            ResponsePayload::ResultRows(groups) => groups.iter().map(Vec::len).sum(),
            _ => 0,
        }
    }
}

/// Turns a response body into exactly one [`ResponsePayload`].
#[derive(Debug, Clone)]
pub struct Classifier {
    pub order: Vec<PayloadKey>,
    /// Candidate names of the row count field; the first one present wins.
    pub count_fields: Vec<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            order: PayloadKey::DEFAULT_ORDER.to_vec(),
            count_fields: vec!["number-of-results".to_string(), "number-of-primes".to_string()],
        }
    }
}

impl Classifier {
    pub fn decode(&self, body: &str) -> Result<ResponsePayload, PollError> {
        let json: Value = serde_json::from_str(body.trim())
            .map_err(|e| PollError::decode(format!("malformed JSON: {}", e), body))?;
        self.classify(json, body)
    }

    fn classify(&self, json: Value, body: &str) -> Result<ResponsePayload, PollError> {
        match json {
            Value::Object(map) => self.classify_object(&map),
            Value::Array(groups) => self.rows(groups, body),
            Value::Null => Err(PollError::decode("null payload", body)),
            _ => Err(PollError::decode("payload is neither an object nor an array", body)),
        }
    }

    fn classify_object(&self, map: &Map<String, Value>) -> Result<ResponsePayload, PollError> {
        for key in &self.order {
            // a null value counts as absent
            let Some(value) = map.get(key.as_str()).filter(|v| !v.is_null()) else {
                continue;
            };
            let payload = match key {
                PayloadKey::Message => ResponsePayload::Message(text_of(value)),
                PayloadKey::PingReplies => ResponsePayload::PingReplies(ping_replies(value)),
                PayloadKey::Info => ResponsePayload::Info(text_of(value)),
                PayloadKey::Warn | PayloadKey::Warning => ResponsePayload::Warning(text_of(value)),
                PayloadKey::Error => ResponsePayload::ErrorMsg(text_of(value)),
            };
            return Ok(payload);
        }
        let keys = map.keys().cloned().collect::<Vec<_>>().join(", ");
        Err(PollError::UnrecognizedPayload(keys))
    }

    fn rows(&self, groups: Vec<Value>, body: &str) -> Result<ResponsePayload, PollError> {
        let mut out = Vec::with_capacity(groups.len());
        for group in groups {
            let Value::Array(items) = group else {
                return Err(PollError::decode("row group is not an array", body));
            };
            let mut rows = Vec::with_capacity(items.len());
            for item in items {
                rows.push(self.row(&item, body)?);
            }
            out.push(rows);
        }
        Ok(ResponsePayload::ResultRows(out))
    }

    fn row(&self, item: &Value, body: &str) -> Result<ResultRow, PollError> {
        let obj = item
            .as_object()
            .ok_or_else(|| PollError::decode("row is not an object", body))?;
        let from = obj.get("from").cloned().unwrap_or(Value::Null);
        let to = obj.get("to").cloned().unwrap_or(Value::Null);
        let count = self
            .count_fields
            .iter()
            .find_map(|k| obj.get(k).and_then(count_of))
            .ok_or_else(|| {
                PollError::decode(
                    format!("row has no count field (expected one of {})", self.count_fields.join(", ")),
                    body,
                )
            })?;
        Ok(ResultRow { from, to, count })
    }
}

/// Strings are shown as-is, anything else as compact JSON.
pub fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn ping_replies(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item.get("pong") {
                Some(pong) => text_of(pong),
                None => text_of(item),
            })
            .collect(),
        other => vec![text_of(other)],
    }
}

fn count_of(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
