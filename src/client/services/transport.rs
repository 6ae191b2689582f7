use crate::client::models::filters::QueryFilters;
use crate::common::errors::PollError;
use async_trait::async_trait;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Issues one GET for an action and hands back the raw body.
///
/// Non-2xx responses and network failures are reported as
/// [`PollError::Transport`]; decoding the body is the caller's business.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, action: &str, filters: &QueryFilters) -> Result<String, PollError>;
}

pub struct HttpTransport {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        // without the trailing slash `join` would drop the last path segment
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("ajax-poller")
            .build()?;
        Ok(Self { client, base_url, timeout })
    }

    /// `<base>/ajax/<action>?symbols=..&stats=..&start=..&end=..`
    pub fn endpoint(&self, action: &str, filters: &QueryFilters) -> Result<Url, PollError> {
        let mut url = self
            .base_url
            .join(&format!("ajax/{}", action.trim_start_matches('/')))
            .map_err(|e| PollError::Transport {
                status: None,
                body: String::new(),
                reason: format!("invalid action '{}': {}", action, e),
            })?;
        let pairs = filters.query_pairs();
        if !pairs.is_empty() {
            let mut query = url.query_pairs_mut();
            for (k, v) in &pairs {
                query.append_pair(k, v);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, action: &str, filters: &QueryFilters) -> Result<String, PollError> {
        let url = self.endpoint(action, filters)?;
        debug!("[POLLER] GET {}", url);

        // the backend answers JSON but expects a plain-text request
        let resp = self
            .client
            .get(url)
            .header(CONTENT_TYPE, "text/plain")
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.map_error(e))?;
        if !status.is_success() {
            return Err(PollError::Transport {
                status: Some(status.as_u16()),
                body,
                reason: status.canonical_reason().unwrap_or("request failed").to_string(),
            });
        }
        Ok(body)
    }
}

impl HttpTransport {
    fn map_error(&self, e: reqwest::Error) -> PollError {
        if e.is_timeout() {
            PollError::Timeout(self.timeout)
        } else {
            PollError::Transport {
                status: e.status().map(|s| s.as_u16()),
                body: String::new(),
                reason: e.to_string(),
            }
        }
    }
}
