use crate::client::config::PollerConfig;
use crate::client::models::events::PollEvent;
use crate::client::models::filters::QueryFilters;
use crate::client::models::poll_state::PollState;
use crate::client::services::transport::Transport;
use crate::client::surface::{Severity, SurfaceMessage};
use crate::common::errors::PollError;
use crate::common::payload::{Classifier, ResponsePayload};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Fixed-cadence request/render loop against the ajax backend.
///
/// Cloning is cheap and every clone drives the same state. At most one
/// request is in flight per poller: every cycle holds `request_slot` from
/// send to render. Loop cycles wait for the slot, one-off polls skip
/// when it is taken.
#[derive(Clone)]
pub struct Poller {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<PollState>,
    filters: Mutex<QueryFilters>,
    transport: Arc<dyn Transport>,
    classifier: Classifier,
    error_severity: Severity,
    request_timeout: Duration,
    request_slot: Mutex<()>,
    events: mpsc::UnboundedSender<PollEvent>,
    /// Handed out once to whoever renders the events
    receiver: std::sync::Mutex<Option<mpsc::UnboundedReceiver<PollEvent>>>,
}

impl Poller {
    pub fn new(config: &PollerConfig, transport: Arc<dyn Transport>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(PollState::new(config.interval)),
                filters: Mutex::new(config.filters.clone()),
                transport,
                classifier: config.classifier(),
                error_severity: config.error_severity,
                request_timeout: config.request_timeout,
                request_slot: Mutex::new(()),
                events: tx,
                receiver: std::sync::Mutex::new(Some(rx)),
            }),
        }
    }

    /// Takes the event receiver; only the first call gets it.
    pub fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<PollEvent>> {
        self.inner.receiver.lock().ok()?.take()
    }

    /// Marks the poller running and launches a loop for `action`.
    ///
    /// Any loop started earlier stops rescheduling once its current cycle
    /// has rendered.
    pub async fn start(&self, action: &str) -> Result<(), PollError> {
        let action = action.trim();
        if action.is_empty() {
            return Err(PollError::EmptyAction);
        }
        let epoch = {
            let mut state = self.inner.state.lock().await;
            state.running = true;
            state.epoch += 1;
            state.action = Some(action.to_string());
            state.epoch
        };
        info!("[POLLER] Starting polling for '{}'", action);
        self.emit(PollEvent::ControlChanged {
            running: true,
            action: Some(action.to_string()),
        });

        let poller = self.clone();
        let action = action.to_string();
        tokio::spawn(async move {
            poller.run_loop(action, epoch).await;
        });
        Ok(())
    }

    /// Stops scheduling. A request already in flight still completes and is rendered.
    pub async fn stop(&self) {
        let (was_running, action) = {
            let mut state = self.inner.state.lock().await;
            let was_running = state.running;
            state.running = false;
            (was_running, state.action.clone())
        };
        if was_running {
            info!("[POLLER] Stopping polling");
            self.emit(PollEvent::ControlChanged { running: false, action });
        }
    }

    pub async fn restart(&self, action: &str) -> Result<(), PollError> {
        self.stop().await;
        self.start(action).await
    }

    /// One request/render cycle for `action`, without rescheduling.
    ///
    /// Does nothing when the poller is stopped or another request is
    /// still in flight. Returns whether a request was sent.
    pub async fn poll(&self, action: &str) -> bool {
        if !self.inner.state.lock().await.running {
            debug!("[POLLER] Not running, skipping poll for '{}'", action);
            return false;
        }
        self.cycle(action, None).await
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.running
    }

    pub async fn state(&self) -> PollState {
        self.inner.state.lock().await.clone()
    }

    pub async fn set_filters(&self, mut filters: QueryFilters) {
        if let Some(note) = filters.fix_range() {
            warn!("[POLLER] {}", note);
            self.emit(PollEvent::Message(SurfaceMessage::warning(note)));
        }
        *self.inner.filters.lock().await = filters;
    }

    pub async fn filters(&self) -> QueryFilters {
        self.inner.filters.lock().await.clone()
    }

    pub async fn set_interval(&self, interval: Duration) {
        self.inner.state.lock().await.interval = interval;
    }

    async fn run_loop(self, action: String, epoch: u64) {
        loop {
            if !self.cycle(&action, Some(epoch)).await {
                break;
            }

            // Reschedule only if nobody stopped or restarted us meanwhile
            let (rescheduled, interval) = {
                let state = self.inner.state.lock().await;
                (state.is_current(epoch), state.interval)
            };
            self.emit(PollEvent::CycleFinished {
                action: action.clone(),
                rescheduled,
            });
            if !rescheduled {
                break;
            }
            tokio::time::sleep(interval).await;
        }
        debug!("[POLLER] Loop for '{}' (epoch {}) ended", action, epoch);
    }

    /// Returns false when no request was sent.
    async fn cycle(&self, action: &str, epoch: Option<u64>) -> bool {
        let _slot = match epoch {
            Some(_) => self.inner.request_slot.lock().await,
            None => match self.inner.request_slot.try_lock() {
                Ok(slot) => slot,
                Err(_) => {
                    info!("[POLLER] Request already in flight, skipping poll for '{}'", action);
                    return false;
                }
            },
        };
        {
            let mut state = self.inner.state.lock().await;
            let allowed = match epoch {
                Some(e) => state.is_current(e),
                None => state.running,
            };
            if !allowed {
                return false;
            }
            state.pending_request = true;
        }

        let filters = self.inner.filters.lock().await.clone();
        let timeout = self.inner.request_timeout;
        let result = match tokio::time::timeout(timeout, self.inner.transport.get(action, &filters)).await {
            Ok(result) => result,
            Err(_) => Err(PollError::Timeout(timeout)),
        };
        self.inner.state.lock().await.pending_request = false;

        let outcome = result.and_then(|body| self.inner.classifier.decode(&body));
        self.render(action, outcome);
        true
    }

    fn render(&self, action: &str, outcome: Result<ResponsePayload, PollError>) {
        let event = match outcome {
            Ok(ResponsePayload::Message(text)) | Ok(ResponsePayload::Info(text)) => {
                PollEvent::Message(SurfaceMessage::info(text))
            }
            Ok(ResponsePayload::PingReplies(replies)) => PollEvent::Message(SurfaceMessage::info(
                format!("Ping replies received from: [{}]", replies.join(", ")),
            )),
            Ok(ResponsePayload::Warning(text)) => PollEvent::Message(SurfaceMessage::warning(text)),
            Ok(ResponsePayload::ErrorMsg(text)) => PollEvent::Message(SurfaceMessage {
                severity: self.inner.error_severity,
                text,
            }),
            Ok(ResponsePayload::ResultRows(groups)) => {
                let rows: Vec<_> = groups.into_iter().flatten().collect();
                debug!("[POLLER] '{}' returned {} rows", action, rows.len());
                PollEvent::Rows(rows)
            }
            Err(e) => {
                match &e {
                    PollError::UnrecognizedPayload(_) => error!("[POLLER] '{}': {}", action, e),
                    _ => warn!("[POLLER] '{}': {}", action, e),
                }
                PollEvent::Message(SurfaceMessage::error(e.to_string()))
            }
        };
        self.emit(event);
    }

    fn emit(&self, event: PollEvent) {
        // nobody listening is not an error
        let _ = self.inner.events.send(event);
    }
}
