use crate::client::models::filters::{parse_date, parse_list, QueryFilters};
use crate::client::surface::Severity;
use crate::common::payload::{Classifier, PayloadKey};
use log::warn;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_INTERVAL_MS: u64 = 3000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub base_url: String,
    pub interval: Duration,
    pub request_timeout: Duration,
    /// Severity used for `error`-keyed payloads.
    pub error_severity: Severity,
    pub classify_order: Vec<PayloadKey>,
    pub count_fields: Vec<String>,
    pub filters: QueryFilters,
}

impl Default for PollerConfig {
    fn default() -> Self {
        let classifier = Classifier::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            error_severity: Severity::Error,
            classify_order: classifier.order,
            count_fields: classifier.count_fields,
            filters: QueryFilters::default(),
        }
    }
}

impl PollerConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset or invalid values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let filters = QueryFilters {
            symbols: lookup("POLL_SYMBOLS").map(|v| parse_list(&v)).unwrap_or_default(),
            stats: lookup("POLL_STATS").map(|v| parse_list(&v)).unwrap_or_default(),
            start: lookup("POLL_START").and_then(|v| parsed_or_warn("POLL_START", &v, parse_date)),
            end: lookup("POLL_END").and_then(|v| parsed_or_warn("POLL_END", &v, parse_date)),
        };
        Self {
            base_url: lookup("POLLER_BASE_URL").unwrap_or(defaults.base_url),
            interval: lookup("POLL_INTERVAL_MS")
                .and_then(|v| parsed_or_warn("POLL_INTERVAL_MS", &v, |s| s.parse::<u64>().map_err(|e| e.to_string())))
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            request_timeout: lookup("REQUEST_TIMEOUT_MS")
                .and_then(|v| parsed_or_warn("REQUEST_TIMEOUT_MS", &v, |s| s.parse::<u64>().map_err(|e| e.to_string())))
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            error_severity: lookup("ERROR_SEVERITY")
                .and_then(|v| parsed_or_warn("ERROR_SEVERITY", &v, Severity::from_str))
                .unwrap_or(defaults.error_severity),
            classify_order: lookup("CLASSIFY_ORDER")
                .and_then(|v| parsed_or_warn("CLASSIFY_ORDER", &v, parse_order))
                .unwrap_or(defaults.classify_order),
            count_fields: lookup("COUNT_FIELDS")
                .map(|v| parse_list(&v))
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.count_fields),
            filters,
        }
    }

    pub fn classifier(&self) -> Classifier {
        Classifier {
            order: self.classify_order.clone(),
            count_fields: self.count_fields.clone(),
        }
    }
}

/// `CLASSIFY_ORDER` is comma separated since `ping replies` contains a space.
fn parse_order(raw: &str) -> Result<Vec<PayloadKey>, String> {
    let order = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PayloadKey::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    if order.is_empty() {
        return Err("empty classification order".to_string());
    }
    Ok(order)
}

fn parsed_or_warn<T, F>(key: &str, raw: &str, parse: F) -> Option<T>
where
    F: Fn(&str) -> Result<T, String>,
{
    match parse(raw) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Ignoring {}={:?}: {}", key, raw, e);
            None
        }
    }
}
