use std::time::Duration;
use thiserror::Error;

/// Everything that can go wrong during a single poll cycle.
///
/// None of these stop the loop: they are rendered to the user surface and
/// the next cycle is scheduled at the usual cadence.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PollError {
    #[error("Invalid data returned by AJAX query: {reason} (body: {body})")]
    Decode { reason: String, body: String },

    #[error("Ajax request failed: status={}, response={body}, error={reason}", fmt_status(.status))]
    Transport {
        status: Option<u16>,
        body: String,
        reason: String,
    },

    #[error("Ajax request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unrecognized payload with keys [{0}]")]
    UnrecognizedPayload(String),

    #[error("action must not be empty")]
    EmptyAction,
}

impl PollError {
    pub fn decode(reason: impl Into<String>, body: &str) -> Self {
        PollError::Decode {
            reason: reason.into(),
            body: body.to_string(),
        }
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string())
}
