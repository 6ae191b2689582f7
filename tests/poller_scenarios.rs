use ajax_poller::client::config::PollerConfig;
use ajax_poller::client::models::events::PollEvent;
use ajax_poller::client::models::filters::QueryFilters;
use ajax_poller::client::services::poller::Poller;
use ajax_poller::client::services::transport::Transport;
use ajax_poller::client::surface::{Severity, Surface, SurfaceMessage};
use ajax_poller::common::errors::PollError;
use ajax_poller::common::payload::ResultRow;
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc::UnboundedReceiver, Notify};
use tokio::time::{sleep, Instant};

const INTERVAL: Duration = Duration::from_millis(3000);

/// Answers from a script, then repeats the fallback forever.
struct ScriptedTransport {
    script: Mutex<VecDeque<Result<String, PollError>>>,
    fallback: Result<String, PollError>,
    delay: Duration,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedTransport {
    fn new(script: Vec<Result<String, PollError>>) -> Arc<Self> {
        Self::with_delay(script, Duration::ZERO)
    }

    fn with_delay(script: Vec<Result<String, PollError>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback: Ok(r#"{"info":"idle"}"#.to_string()),
            delay,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, action: &str, _filters: &QueryFilters) -> Result<String, PollError> {
        self.calls.lock().unwrap().push((action.to_string(), Instant::now()));
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Blocks every request until the test releases it.
struct GatedTransport {
    entered: Notify,
    release: Notify,
    calls: AtomicUsize,
}

#[async_trait]
impl Transport for GatedTransport {
    async fn get(&self, _action: &str, _filters: &QueryFilters) -> Result<String, PollError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(r#"{"message":"late answer"}"#.to_string())
    }
}

/// Slow transport that remembers the most requests it ever saw at once.
#[derive(Default)]
struct OverlapTransport {
    current: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl Transport for OverlapTransport {
    async fn get(&self, _action: &str, _filters: &QueryFilters) -> Result<String, PollError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        sleep(Duration::from_secs(1)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(r#"{"info":"done"}"#.to_string())
    }
}

struct HangingTransport;

#[async_trait]
impl Transport for HangingTransport {
    async fn get(&self, _action: &str, _filters: &QueryFilters) -> Result<String, PollError> {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

fn poller_with(
    transport: Arc<dyn Transport>,
    tweak: impl FnOnce(&mut PollerConfig),
) -> (Poller, UnboundedReceiver<PollEvent>) {
    let mut config = PollerConfig {
        interval: INTERVAL,
        ..PollerConfig::default()
    };
    tweak(&mut config);
    let poller = Poller::new(&config, transport);
    let rx = poller.take_receiver().expect("receiver");
    (poller, rx)
}

async fn next_event(rx: &mut UnboundedReceiver<PollEvent>) -> PollEvent {
    tokio::time::timeout(Duration::from_secs(120), rx.recv())
        .await
        .expect("no event in time")
        .expect("event channel closed")
}

async fn next_message(rx: &mut UnboundedReceiver<PollEvent>) -> SurfaceMessage {
    loop {
        if let PollEvent::Message(msg) = next_event(rx).await {
            return msg;
        }
    }
}

async fn next_cycle_end(rx: &mut UnboundedReceiver<PollEvent>) -> bool {
    loop {
        if let PollEvent::CycleFinished { rescheduled, .. } = next_event(rx).await {
            return rescheduled;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn start_then_stop_sends_at_most_one_request() {
    for action in ["stats", "primes", "ping", "x"] {
        let transport = ScriptedTransport::new(vec![]);
        let (poller, _rx) = poller_with(transport.clone(), |_| {});
        poller.start(action).await.unwrap();
        poller.stop().await;
        sleep(Duration::from_secs(30)).await;
        assert!(transport.count() <= 1, "{} sent {} requests", action, transport.count());
    }
}

#[tokio::test(start_paused = true)]
async fn malformed_json_is_reported_and_polling_continues() {
    let transport = ScriptedTransport::new(vec![Ok("{not json".to_string())]);
    let (poller, mut rx) = poller_with(transport.clone(), |_| {});
    poller.start("results").await.unwrap();

    let msg = next_message(&mut rx).await;
    assert_eq!(msg.severity, Severity::Error);
    assert!(msg.text.contains("Invalid data returned by AJAX query"), "{}", msg.text);
    assert!(next_cycle_end(&mut rx).await);

    assert_eq!(next_message(&mut rx).await, SurfaceMessage::info("idle"));
    assert_eq!(transport.count(), 2);
    poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn warning_is_shown_and_next_poll_follows_the_interval() {
    let transport = ScriptedTransport::new(vec![Ok(r#"{"warning":"rate limited"}"#.to_string())]);
    let (poller, mut rx) = poller_with(transport.clone(), |_| {});
    poller.start("stats").await.unwrap();

    let msg = next_message(&mut rx).await;
    assert_eq!(msg.severity, Severity::Warning);
    assert!(msg.text.contains("rate limited"));
    assert!(next_cycle_end(&mut rx).await);

    next_message(&mut rx).await;
    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|(action, _)| action == "stats"));
    let gap = calls[1].1 - calls[0].1;
    assert!(gap >= INTERVAL && gap < INTERVAL + Duration::from_millis(50), "gap was {:?}", gap);
    poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn single_row_payload_renders_one_row() {
    let transport = ScriptedTransport::new(vec![Ok(
        r#"[[{"from":1,"to":10,"number-of-results":5}]]"#.to_string(),
    )]);
    let (poller, mut rx) = poller_with(transport, |_| {});
    let mut surface = Surface::new("number-of-results");
    poller.start("results").await.unwrap();

    loop {
        let event = next_event(&mut rx).await;
        surface.apply(&event);
        if matches!(event, PollEvent::Rows(_)) {
            break;
        }
    }
    poller.stop().await;
    assert_eq!(
        surface.rows(),
        [ResultRow { from: json!(1), to: json!(10), count: 5 }]
    );
}

#[tokio::test(start_paused = true)]
async fn stop_during_request_still_renders_then_goes_idle() {
    let transport = Arc::new(GatedTransport {
        entered: Notify::new(),
        release: Notify::new(),
        calls: AtomicUsize::new(0),
    });
    let (poller, mut rx) = poller_with(transport.clone(), |_| {});
    poller.start("primes").await.unwrap();

    transport.entered.notified().await;
    poller.stop().await;
    assert!(poller.state().await.pending_request);
    transport.release.notify_one();

    assert_eq!(next_message(&mut rx).await, SurfaceMessage::info("late answer"));
    assert!(!next_cycle_end(&mut rx).await);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    assert!(!poller.state().await.pending_request);
}

#[tokio::test(start_paused = true)]
async fn stopping_twice_equals_stopping_once() {
    let transport = ScriptedTransport::new(vec![]);
    let (poller, mut rx) = poller_with(transport, |_| {});
    poller.start("ping").await.unwrap();

    poller.stop().await;
    let after_one = poller.state().await;
    poller.stop().await;
    assert_eq!(poller.state().await, after_one);

    sleep(Duration::from_secs(10)).await;
    let mut control = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let PollEvent::ControlChanged { running, .. } = event {
            control.push(running);
        }
    }
    assert_eq!(control, vec![true, false]);
    assert!(!poller.is_running().await);
}

#[tokio::test(start_paused = true)]
async fn transport_errors_do_not_stop_the_loop() {
    let transport = ScriptedTransport::new(vec![Err(PollError::Transport {
        status: Some(500),
        body: "boom".to_string(),
        reason: "Internal Server Error".to_string(),
    })]);
    let (poller, mut rx) = poller_with(transport.clone(), |_| {});
    poller.start("stats").await.unwrap();

    let msg = next_message(&mut rx).await;
    assert_eq!(msg.severity, Severity::Error);
    assert!(msg.text.contains("500") && msg.text.contains("boom"), "{}", msg.text);

    assert_eq!(next_message(&mut rx).await, SurfaceMessage::info("idle"));
    poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn hung_request_times_out_and_is_rescheduled() {
    let (poller, mut rx) = poller_with(Arc::new(HangingTransport), |c| {
        c.request_timeout = Duration::from_secs(5);
    });
    let started = Instant::now();
    poller.start("stats").await.unwrap();

    let msg = next_message(&mut rx).await;
    assert_eq!(msg.severity, Severity::Error);
    assert!(msg.text.contains("timed out"));
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(next_cycle_end(&mut rx).await);
    poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unrecognized_object_is_an_error() {
    let transport = ScriptedTransport::new(vec![Ok(r#"{"status":"ok"}"#.to_string())]);
    let (poller, mut rx) = poller_with(transport, |_| {});
    poller.start("stats").await.unwrap();

    let msg = next_message(&mut rx).await;
    assert_eq!(msg.severity, Severity::Error);
    assert!(msg.text.contains("Unrecognized payload"));
    poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn error_payload_severity_is_configurable() {
    let body = r#"{"error":"no data for symbol"}"#.to_string();

    let transport = ScriptedTransport::new(vec![Ok(body.clone())]);
    let (poller, mut rx) = poller_with(transport, |_| {});
    poller.start("stats").await.unwrap();
    assert_eq!(next_message(&mut rx).await.severity, Severity::Error);
    poller.stop().await;

    let transport = ScriptedTransport::new(vec![Ok(body)]);
    let (poller, mut rx) = poller_with(transport, |c| c.error_severity = Severity::Info);
    poller.start("stats").await.unwrap();
    assert_eq!(
        next_message(&mut rx).await,
        SurfaceMessage::info("no data for symbol")
    );
    poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn ping_replies_are_listed() {
    let transport = ScriptedTransport::new(vec![Ok(
        r#"{"ping replies":[{"pong":"node-a"},{"pong":"node-b"}]}"#.to_string(),
    )]);
    let (poller, mut rx) = poller_with(transport, |_| {});
    poller.start("ping").await.unwrap();
    assert_eq!(
        next_message(&mut rx).await,
        SurfaceMessage::info("Ping replies received from: [node-a, node-b]")
    );
    poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn restart_during_request_keeps_a_single_loop() {
    let transport = ScriptedTransport::with_delay(vec![], Duration::from_secs(1));
    let (poller, _rx) = poller_with(transport.clone(), |_| {});
    poller.start("a").await.unwrap();
    sleep(Duration::from_millis(500)).await;
    poller.restart("b").await.unwrap();
    sleep(Duration::from_secs(20)).await;
    poller.stop().await;

    let calls = transport.calls();
    let a_calls = calls.iter().filter(|(action, _)| action == "a").count();
    let b_times: Vec<Instant> = calls.iter().filter(|(action, _)| action == "b").map(|(_, t)| *t).collect();
    assert_eq!(a_calls, 1);
    assert!(b_times.len() >= 2);
    // one request plus one interval between consecutive requests
    for pair in b_times.windows(2) {
        assert!(pair[1] - pair[0] >= INTERVAL + Duration::from_secs(1));
    }
}

#[tokio::test(start_paused = true)]
async fn poll_during_an_active_loop_never_overlaps() {
    let transport = Arc::new(OverlapTransport::default());
    let (poller, _rx) = poller_with(transport.clone(), |_| {});
    poller.start("stats").await.unwrap();

    sleep(Duration::from_millis(100)).await;
    assert!(poller.state().await.pending_request);
    assert!(!poller.poll("stats").await);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

    // between cycles the slot is free again
    sleep(Duration::from_secs(2)).await;
    assert!(!poller.state().await.pending_request);
    assert!(poller.poll("stats").await);

    sleep(Duration::from_secs(10)).await;
    poller.stop().await;
    assert_eq!(transport.peak.load(Ordering::SeqCst), 1);
    assert!(transport.calls.load(Ordering::SeqCst) >= 3);
}

#[tokio::test(start_paused = true)]
async fn restart_waits_for_the_request_in_flight() {
    let transport = Arc::new(OverlapTransport::default());
    let (poller, _rx) = poller_with(transport.clone(), |_| {});
    poller.start("a").await.unwrap();
    sleep(Duration::from_millis(500)).await;
    poller.restart("b").await.unwrap();
    sleep(Duration::from_secs(10)).await;
    poller.stop().await;
    assert_eq!(transport.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn poll_is_a_no_op_when_stopped() {
    let transport = ScriptedTransport::new(vec![]);
    let (poller, mut rx) = poller_with(transport.clone(), |_| {});

    // running from creation: a single poll goes through but does not loop
    assert!(poller.poll("ping").await);
    assert_eq!(next_message(&mut rx).await, SurfaceMessage::info("idle"));
    sleep(Duration::from_secs(10)).await;
    assert_eq!(transport.count(), 1);

    poller.stop().await;
    assert!(!poller.poll("ping").await);
    assert_eq!(transport.count(), 1);
}

#[tokio::test]
async fn empty_action_is_rejected() {
    let (poller, _rx) = poller_with(ScriptedTransport::new(vec![]), |_| {});
    assert_eq!(poller.start("").await, Err(PollError::EmptyAction));
    assert_eq!(poller.start("   ").await, Err(PollError::EmptyAction));
    assert!(poller.take_receiver().is_none());
}

#[tokio::test]
async fn inverted_date_range_is_fixed_with_a_warning() {
    let (poller, mut rx) = poller_with(ScriptedTransport::new(vec![]), |_| {});
    let filters = QueryFilters {
        start: chrono::NaiveDate::from_ymd_opt(2012, 3, 1),
        end: chrono::NaiveDate::from_ymd_opt(2012, 2, 1),
        ..QueryFilters::default()
    };
    poller.set_filters(filters).await;
    assert_eq!(
        poller.filters().await.start,
        chrono::NaiveDate::from_ymd_opt(2012, 1, 31)
    );
    assert_eq!(next_message(&mut rx).await.severity, Severity::Warning);
}
