use std::time::Duration;

/// State shared between the command surface and the poll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PollState {
    pub running: bool,
    pub interval: Duration,
    pub pending_request: bool,
    /// Action of the most recent `start`.
    pub action: Option<String>,
    /// Bumped by every `start`; a loop keeps rescheduling only while its epoch is current.
    pub(crate) epoch: u64,
}

impl PollState {
    pub fn new(interval: Duration) -> Self {
        Self {
            running: true,
            interval,
            pending_request: false,
            action: None,
            epoch: 0,
        }
    }

    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.running && self.epoch == epoch
    }
}
