//! Repeating, single-flight analysis cycles.
//!
//! One flag guards every cycle, whether the timer or the operator started it.
//! Stopping the timer never interrupts a cycle that is already running: its
//! results are still counted, it just cannot lead to another cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::alerts::AlertDispatcher;
use crate::api::ApiClient;
use crate::error::{InferenceErrorKind, SessionError};
use crate::events::{emit_status, EngineEvent, EventSink, StatusLevel};
use crate::models::{InferenceRequest, InferenceResult, SharedConfig};
use crate::registry::CameraRegistry;

use super::breaker::{BreakerVerdict, CircuitBreaker, CycleTally};
use super::state::{ModeCell, ModeEvent};

const ENABLE_LOGS: bool = true;
use crate::{log_debug, log_info, log_warn};

const LATENCY_TITLE: &str = "Ollama latency";
const SLOW_MESSAGE: &str = "Inference is slow. Consider a smaller model or longer interval.";
const MONITORING_TITLE: &str = "Monitoring";
const PAUSED_MESSAGE: &str = "Paused after repeated timeouts. Try a smaller model or longer interval.";
const TEST_TITLE: &str = "Inference test";
const TEST_BUSY: &str = "An inference request is already running.";
const TEST_INCOMPLETE: &str = "Set host, port, model, and prompt before testing.";
const TEST_NO_SOURCE: &str = "Provide a preview or stream URL before running inference.";
const TEST_UNREACHABLE: &str = "Failed to reach Ollama host.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotArmed,
    InFlight,
    /// No cameras selected, or host, port, model or prompt missing.
    NothingToAnalyze,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    Skipped(SkipReason),
    Completed {
        tally: CycleTally,
        verdict: BreakerVerdict,
    },
    /// The session closed mid-cycle.
    Aborted(String),
}

/// Outcome of a one-off operator inference test.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceTestReport {
    /// Nothing was sent; the warning it surfaced.
    Refused(&'static str),
    Completed(InferenceResult),
    /// The session closed mid-test.
    Aborted(String),
}

struct Ticker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Releases the in-flight flag when the cycle ends, however it ends.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct SchedulerInner {
    api: ApiClient,
    registry: Arc<CameraRegistry>,
    config: SharedConfig,
    dispatcher: Arc<AlertDispatcher>,
    mode: ModeCell,
    sink: Arc<dyn EventSink>,
    session_closed: CancellationToken,
    breaker: Mutex<CircuitBreaker>,
    in_flight: AtomicBool,
    inference_active: AtomicBool,
    ticker: tokio::sync::Mutex<Option<Ticker>>,
}

#[derive(Clone)]
pub struct AnalysisScheduler {
    inner: Arc<SchedulerInner>,
}

impl AnalysisScheduler {
    pub fn new(
        api: ApiClient,
        registry: Arc<CameraRegistry>,
        config: SharedConfig,
        dispatcher: Arc<AlertDispatcher>,
        mode: ModeCell,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let session_closed = api.guard().closed_token();
        Self {
            inner: Arc::new(SchedulerInner {
                api,
                registry,
                config,
                dispatcher,
                mode,
                sink,
                session_closed,
                breaker: Mutex::new(CircuitBreaker::new()),
                in_flight: AtomicBool::new(false),
                inference_active: AtomicBool::new(false),
                ticker: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Start (or restart) the repeating timer. A no-op unless armed.
    pub async fn start(&self, immediate: bool) -> bool {
        let inner = &self.inner;
        if !inner.mode.mode().is_armed() {
            log_debug!("scheduler start ignored: monitoring is not armed");
            return false;
        }
        if inner.session_closed.is_cancelled() {
            log_debug!("scheduler start ignored: session closed");
            return false;
        }

        let period = inner.config.inference().cycle_interval();
        let mut ticker = inner.ticker.lock().await;
        if let Some(previous) = ticker.take() {
            previous.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(ticker_loop(inner.clone(), period, immediate, cancel.clone()));
        *ticker = Some(Ticker { cancel, handle });

        log_info!("analysis scheduler started, interval={}s", period.as_secs());
        true
    }

    /// Stop the timer. A cycle already in flight runs to completion.
    pub async fn stop(&self) -> bool {
        self.inner.stop_timer().await
    }

    pub async fn is_running(&self) -> bool {
        self.inner
            .ticker
            .lock()
            .await
            .as_ref()
            .map(|ticker| !ticker.handle.is_finished())
            .unwrap_or(false)
    }

    /// Run one cycle now, unless one is already in flight.
    pub async fn run_once(&self) -> CycleReport {
        self.inner.run_cycle().await
    }

    /// One analysis of the active camera, armed or not. Shares the
    /// single-flight flag with cycles but never touches the breaker or the
    /// alert counter.
    pub async fn test_inference(&self) -> InferenceTestReport {
        self.inner.test_inference().await
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub fn inference_active(&self) -> bool {
        self.inner.inference_active.load(Ordering::SeqCst)
    }

    pub fn clear_inference_active(&self) {
        self.inner.inference_active.store(false, Ordering::SeqCst);
    }

    pub fn timeout_streak(&self) -> u32 {
        self.inner.breaker().streak()
    }

    pub fn reset_breaker(&self) {
        self.inner.breaker().reset();
    }
}

impl SchedulerInner {
    fn breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.breaker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn stop_timer(&self) -> bool {
        match self.ticker.lock().await.take() {
            Some(ticker) => {
                ticker.cancel.cancel();
                log_info!("analysis scheduler stopped");
                true
            }
            None => false,
        }
    }

    async fn run_cycle(&self) -> CycleReport {
        if !self.mode.mode().is_armed() {
            return CycleReport::Skipped(SkipReason::NotArmed);
        }
        let Some(_flight) = FlightGuard::acquire(&self.in_flight) else {
            log_debug!("cycle already in flight; skipping");
            return CycleReport::Skipped(SkipReason::InFlight);
        };

        let settings = self.config.inference();
        let (cameras, monitor_all) = self.registry.cycle_targets();
        if cameras.is_empty() || !settings.is_complete() {
            return CycleReport::Skipped(SkipReason::NothingToAnalyze);
        }

        let mut tally = CycleTally::default();
        for camera in &cameras {
            if !self.mode.mode().is_armed() {
                log_info!("monitoring left armed mode mid-cycle; remaining cameras skipped");
                break;
            }

            let request = InferenceRequest::for_camera(&settings, camera);
            let result = match self.api.analyze(&request).await {
                Ok(result) => result,
                Err(err) => {
                    log_warn!("cycle aborted: {err}");
                    return CycleReport::Aborted(err.to_string());
                }
            };

            tally.record(&result);
            if result.ok {
                if let Err(err) = self.dispatcher.handle_success(camera, &result).await {
                    log_warn!("cycle aborted during alert delivery: {err}");
                    return CycleReport::Aborted(err.to_string());
                }
            } else {
                self.dispatcher.report_failure(camera, &result, monitor_all);
            }
        }

        if tally.successes > 0 {
            self.inference_active.store(true, Ordering::SeqCst);
            self.sink.emit(EngineEvent::InferenceActive);
            self.refresh_responses().await;
        }

        let verdict = self.breaker().record_cycle(tally);
        match verdict {
            BreakerVerdict::Tripped => self.trip().await,
            BreakerVerdict::Slow => {
                emit_status(self.sink.as_ref(), LATENCY_TITLE, StatusLevel::Warn, SLOW_MESSAGE)
            }
            BreakerVerdict::Steady => {}
        }

        CycleReport::Completed { tally, verdict }
    }

    async fn trip(&self) {
        self.stop_timer().await;
        if self.mode.apply(ModeEvent::BreakerTripped).is_some() {
            emit_status(
                self.sink.as_ref(),
                MONITORING_TITLE,
                StatusLevel::Warn,
                PAUSED_MESSAGE,
            );
        }
    }

    async fn test_inference(&self) -> InferenceTestReport {
        let Some(_flight) = FlightGuard::acquire(&self.in_flight) else {
            return self.refuse_test(TEST_BUSY);
        };

        let settings = self.config.inference();
        if !settings.is_complete() {
            return self.refuse_test(TEST_INCOMPLETE);
        }
        let camera = match self.registry.active() {
            Some(camera)
                if !camera.stream_url.trim().is_empty() || !camera.preview_url.trim().is_empty() =>
            {
                camera
            }
            _ => return self.refuse_test(TEST_NO_SOURCE),
        };

        emit_status(
            self.sink.as_ref(),
            TEST_TITLE,
            StatusLevel::Info,
            "Running a single inference request...",
        );
        let request = InferenceRequest::for_camera(&settings, &camera);
        let result = match self.api.analyze(&request).await {
            Ok(result) => result,
            Err(err) => return InferenceTestReport::Aborted(err.to_string()),
        };

        if !result.ok {
            let message = if result.error_kind == Some(InferenceErrorKind::NetworkError) {
                TEST_UNREACHABLE
            } else {
                result.error_message()
            };
            emit_status(self.sink.as_ref(), TEST_TITLE, StatusLevel::Error, message);
            return InferenceTestReport::Completed(result);
        }

        let outcome = if result.triggered { "YES" } else { "NO" };
        emit_status(
            self.sink.as_ref(),
            TEST_TITLE,
            StatusLevel::Ok,
            format!("Inference completed. Triggered: {outcome}."),
        );
        if result.triggered {
            if let Err(err) = self.dispatcher.send_inference_test_email(&camera, &result).await {
                return InferenceTestReport::Aborted(err.to_string());
            }
        }
        self.refresh_responses().await;
        InferenceTestReport::Completed(result)
    }

    fn refuse_test(&self, reason: &'static str) -> InferenceTestReport {
        emit_status(self.sink.as_ref(), TEST_TITLE, StatusLevel::Warn, reason);
        InferenceTestReport::Refused(reason)
    }

    async fn refresh_responses(&self) {
        match self.api.fetch_responses().await {
            Ok(entries) => self.sink.emit(EngineEvent::ResponsesRefreshed { entries }),
            Err(err)
                if err
                    .downcast_ref::<SessionError>()
                    .is_some_and(SessionError::is_closed) =>
            {
                log_debug!("response log refresh dropped: {err}");
            }
            Err(err) => self.dispatcher.report_response_log_failure(&format!("{err:#}")),
        }
    }
}

async fn ticker_loop(
    inner: Arc<SchedulerInner>,
    period: Duration,
    immediate: bool,
    cancel: CancellationToken,
) {
    let first = if immediate {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut ticker = time::interval_at(first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = inner.session_closed.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // Cycles run beside the ticker, so a tick that lands mid-cycle is
        // dropped by the in-flight flag instead of queueing behind it.
        let cycle = inner.clone();
        tokio::spawn(async move {
            let report = cycle.run_cycle().await;
            log_debug!("timer cycle finished: {report:?}");
        });
    }

    log_debug!("analysis ticker exited");
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::{AlertSettings, CameraTarget, InferenceSettings, MonitorConfig, Responder};
    use crate::monitor::MonitoringMode;
    use crate::session::{FixedAnswer, SessionGuard};
    use crate::testing::{MockTransport, RecordingSink};

    const ANALYZE: &str = "/api/ollama-analyze";
    const ANALYSIS_TITLE: &str = "Ollama analysis";

    struct Fixture {
        transport: Arc<MockTransport>,
        sink: Arc<RecordingSink>,
        mode: ModeCell,
        config: SharedConfig,
        registry: Arc<CameraRegistry>,
        scheduler: AnalysisScheduler,
    }

    fn settings() -> InferenceSettings {
        InferenceSettings {
            host: "gpu.local".into(),
            port: 11434,
            model: "llava".into(),
            prompt: "Has anyone fallen?".into(),
            trigger: "YES".into(),
            timeout_seconds: Some(60),
            interval_seconds: Some(10),
        }
    }

    async fn fixture(cameras: &[&str], monitor_all: bool) -> Fixture {
        let transport = Arc::new(MockTransport::new());
        transport.reply("/api/session/start", 200, json!({"ok": true}));
        transport.reply("/api/ollama-responses", 200, json!({"ok": true, "responses": []}));
        let sink = Arc::new(RecordingSink::default());

        let guard = Arc::new(SessionGuard::new(transport.clone(), "tok", "Bob", sink.clone()));
        guard.begin(&FixedAnswer(false)).await;
        let api = ApiClient::new(guard);

        let config = SharedConfig::new(MonitorConfig {
            ollama: settings(),
            ..MonitorConfig::default()
        });
        let registry = Arc::new(CameraRegistry::new());
        for name in cameras {
            registry.add(CameraTarget {
                id: name.to_lowercase(),
                name: name.to_string(),
                ..CameraTarget::default()
            })
            .unwrap();
        }
        registry.set_monitor_all(monitor_all);

        let mode = ModeCell::new(sink.clone());
        mode.apply(ModeEvent::Arm);
        let dispatcher = Arc::new(AlertDispatcher::new(api.clone(), config.clone(), sink.clone()));
        let scheduler = AnalysisScheduler::new(
            api,
            registry.clone(),
            config.clone(),
            dispatcher,
            mode.clone(),
            sink.clone(),
        );

        Fixture {
            transport,
            sink,
            mode,
            config,
            registry,
            scheduler,
        }
    }

    async fn wait_in_flight(scheduler: &AnalysisScheduler) {
        while !scheduler.is_in_flight() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn cycles_are_ignored_unless_armed() {
        let f = fixture(&["Hall"], false).await;
        f.mode.apply(ModeEvent::OperatorDisarm);

        assert_eq!(f.scheduler.run_once().await, CycleReport::Skipped(SkipReason::NotArmed));
        assert!(!f.scheduler.start(true).await);
        assert!(f.transport.requests_to(ANALYZE).is_empty());
    }

    #[tokio::test]
    async fn incomplete_settings_make_a_silent_no_op() {
        let f = fixture(&["Hall"], false).await;
        f.config.replace(MonitorConfig::default());

        assert_eq!(
            f.scheduler.run_once().await,
            CycleReport::Skipped(SkipReason::NothingToAnalyze)
        );
        assert!(f.transport.requests_to(ANALYZE).is_empty());
        assert!(f.sink.statuses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_run_once_is_skipped() {
        let f = fixture(&["Hall"], false).await;
        f.transport
            .reply_after(ANALYZE, Duration::from_secs(5), 200, json!({"ok": true, "triggered": false, "response": "NO"}));

        let first = {
            let scheduler = f.scheduler.clone();
            tokio::spawn(async move { scheduler.run_once().await })
        };
        wait_in_flight(&f.scheduler).await;

        assert_eq!(f.scheduler.run_once().await, CycleReport::Skipped(SkipReason::InFlight));
        assert!(matches!(first.await.unwrap(), CycleReport::Completed { .. }));
        assert!(!f.scheduler.is_in_flight());
        assert_eq!(f.transport.requests_to(ANALYZE).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cameras_are_analyzed_one_at_a_time() {
        let f = fixture(&["Hall", "Kitchen", "Porch"], true).await;
        f.transport
            .reply_after(ANALYZE, Duration::from_secs(2), 200, json!({"ok": true, "triggered": false}));

        let report = f.scheduler.run_once().await;

        let CycleReport::Completed { tally, .. } = report else {
            panic!("unexpected report {report:?}");
        };
        assert_eq!(tally.successes, 3);
        assert_eq!(f.transport.peak_in_flight(), 1);
        let ids: Vec<_> = f
            .transport
            .requests_to(ANALYZE)
            .into_iter()
            .map(|request| request.body.unwrap()["cameraId"].clone())
            .collect();
        assert_eq!(ids, vec![json!("hall"), json!("kitchen"), json!("porch")]);
    }

    #[tokio::test]
    async fn single_timeout_warns_about_latency() {
        let f = fixture(&["Hall"], false).await;
        f.transport.reply(ANALYZE, 200, json!({"ok": false, "error": "timed out"}));

        f.scheduler.run_once().await;

        assert_eq!(f.scheduler.timeout_streak(), 1);
        let warnings = f.sink.statuses_titled(LATENCY_TITLE);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].detail, SLOW_MESSAGE);
        assert_eq!(f.sink.statuses_titled(ANALYSIS_TITLE)[0].detail, "timed out");
    }

    #[tokio::test]
    async fn backend_errors_do_not_move_the_streak() {
        let f = fixture(&["Hall"], false).await;
        f.transport.reply(ANALYZE, 200, json!({"ok": false, "error": "timed out"}));
        f.transport.reply(ANALYZE, 500, json!({"ok": false, "error": "model not found"}));

        f.scheduler.run_once().await;
        f.scheduler.run_once().await;

        assert_eq!(f.scheduler.timeout_streak(), 1);
        assert_eq!(f.mode.mode(), MonitoringMode::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn three_timeout_cycles_pause_and_stop_the_timer() {
        let f = fixture(&["Hall"], false).await;
        f.transport.reply(ANALYZE, 200, json!({"ok": false, "error": "timed out"}));

        assert!(f.scheduler.start(true).await);
        time::sleep(Duration::from_secs(25)).await;

        assert_eq!(f.mode.mode(), MonitoringMode::Paused);
        assert!(!f.scheduler.is_running().await);
        assert_eq!(f.transport.requests_to(ANALYZE).len(), 3);
        let paused: Vec<_> = f
            .sink
            .statuses_titled(MONITORING_TITLE)
            .into_iter()
            .filter(|entry| entry.detail == PAUSED_MESSAGE)
            .collect();
        assert_eq!(paused.len(), 1);
        assert_eq!(paused[0].level, StatusLevel::Warn);

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(f.transport.requests_to(ANALYZE).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_mid_cycle_finishes_the_request_but_dispatches_no_more() {
        let f = fixture(&["Hall", "Kitchen"], true).await;
        f.transport
            .reply_after(ANALYZE, Duration::from_secs(5), 200, json!({"ok": true, "triggered": false}));
        assert!(f.scheduler.start(true).await);
        wait_in_flight(&f.scheduler).await;

        f.scheduler.stop().await;
        f.mode.apply(ModeEvent::OperatorDisarm);
        time::sleep(Duration::from_secs(30)).await;

        assert!(!f.scheduler.is_in_flight());
        assert_eq!(f.transport.requests_to(ANALYZE).len(), 1);
        assert!(f.scheduler.inference_active());
        assert_eq!(f.transport.requests_to("/api/ollama-responses").len(), 1);
    }

    #[tokio::test]
    async fn closed_session_aborts_the_cycle() {
        let f = fixture(&["Hall", "Kitchen"], true).await;
        f.transport.reply(ANALYZE, 403, json!({"kicked_by": "Carol"}));

        let report = f.scheduler.run_once().await;

        assert_eq!(report, CycleReport::Aborted("Session closed: You have been logged off by Carol.".into()));
        assert_eq!(f.transport.requests_to(ANALYZE).len(), 1);
        assert!(!f.scheduler.start(true).await);
    }

    #[tokio::test]
    async fn success_refreshes_response_log() {
        let f = fixture(&["Hall"], false).await;
        f.transport.reply(ANALYZE, 200, json!({"ok": true, "triggered": false, "response": "NO"}));
        f.transport.clear("/api/ollama-responses");
        f.transport.reply(
            "/api/ollama-responses",
            200,
            json!({"ok": true, "responses": [{"timestamp": 1.0, "text": "NO", "model": "llava", "triggered": false, "camera_id": "hall"}]}),
        );

        f.scheduler.run_once().await;

        let refreshed = f
            .sink
            .events()
            .into_iter()
            .find_map(|event| match event {
                EngineEvent::ResponsesRefreshed { entries } => Some(entries),
                _ => None,
            })
            .unwrap();
        assert_eq!(refreshed.len(), 1);
        assert_eq!(refreshed[0].camera_id, "hall");
    }

    #[tokio::test]
    async fn failing_response_log_warns_once() {
        let f = fixture(&["Hall"], false).await;
        f.transport.reply(ANALYZE, 200, json!({"ok": true, "triggered": false}));
        f.transport.clear("/api/ollama-responses");
        f.transport.reply("/api/ollama-responses", 500, json!({"ok": false}));

        f.scheduler.run_once().await;
        f.scheduler.run_once().await;

        let warnings = f.sink.statuses_titled("Response log");
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].detail,
            "Unable to refresh the response log: response log answered HTTP 500"
        );
        assert_eq!(f.transport.requests_to("/api/ollama-responses").len(), 2);
    }

    fn with_stream(registry: &CameraRegistry, id: &str) {
        let mut camera = registry.active().unwrap();
        camera.stream_url = format!("rtsp://{id}.local/stream1");
        registry.update(id, camera).unwrap();
    }

    #[tokio::test]
    async fn inference_test_runs_while_disarmed() {
        let f = fixture(&["Hall"], false).await;
        f.mode.apply(ModeEvent::OperatorDisarm);
        with_stream(&f.registry, "hall");
        f.transport.reply(ANALYZE, 200, json!({"ok": true, "triggered": false, "response": "NO"}));

        let report = f.scheduler.test_inference().await;

        assert_eq!(report, InferenceTestReport::Completed(InferenceResult::success(false, "NO")));
        let details: Vec<_> = f
            .sink
            .statuses_titled(TEST_TITLE)
            .into_iter()
            .map(|entry| entry.detail)
            .collect();
        assert_eq!(
            details,
            vec!["Running a single inference request...", "Inference completed. Triggered: NO."]
        );
        let sent = f.transport.requests_to(ANALYZE);
        assert_eq!(sent[0].body.as_ref().unwrap()["streamUrl"], "rtsp://hall.local/stream1");
        assert_eq!(f.scheduler.timeout_streak(), 0);
        assert!(!f.scheduler.is_in_flight());
    }

    #[tokio::test]
    async fn inference_test_needs_settings_and_a_camera_source() {
        let f = fixture(&["Hall"], false).await;

        assert_eq!(
            f.scheduler.test_inference().await,
            InferenceTestReport::Refused(TEST_NO_SOURCE)
        );

        with_stream(&f.registry, "hall");
        f.config.replace(MonitorConfig::default());
        assert_eq!(
            f.scheduler.test_inference().await,
            InferenceTestReport::Refused(TEST_INCOMPLETE)
        );
        assert!(f.transport.requests_to(ANALYZE).is_empty());
        assert!(f
            .sink
            .statuses_titled(TEST_TITLE)
            .iter()
            .all(|entry| entry.level == StatusLevel::Warn));
    }

    #[tokio::test(start_paused = true)]
    async fn inference_test_waits_for_no_running_cycle() {
        let f = fixture(&["Hall"], false).await;
        with_stream(&f.registry, "hall");
        f.transport
            .reply_after(ANALYZE, Duration::from_secs(5), 200, json!({"ok": true, "triggered": false}));

        let cycle = {
            let scheduler = f.scheduler.clone();
            tokio::spawn(async move { scheduler.run_once().await })
        };
        wait_in_flight(&f.scheduler).await;

        assert_eq!(f.scheduler.test_inference().await, InferenceTestReport::Refused(TEST_BUSY));
        cycle.await.unwrap();
        assert_eq!(f.transport.requests_to(ANALYZE).len(), 1);
    }

    #[tokio::test]
    async fn unreachable_host_gets_a_plain_message() {
        let f = fixture(&["Hall"], false).await;
        with_stream(&f.registry, "hall");
        f.transport.fail(ANALYZE, "connection refused");

        let report = f.scheduler.test_inference().await;

        assert!(matches!(report, InferenceTestReport::Completed(ref result) if !result.ok));
        let last = f.sink.statuses_titled(TEST_TITLE).pop().unwrap();
        assert_eq!(last.level, StatusLevel::Error);
        assert_eq!(last.detail, TEST_UNREACHABLE);
        assert_eq!(f.scheduler.timeout_streak(), 0);
    }

    #[tokio::test]
    async fn triggered_test_sends_a_test_email_without_counting() {
        let f = fixture(&["Hall"], false).await;
        with_stream(&f.registry, "hall");
        let mut config = f.config.get();
        config.alerts = AlertSettings {
            email_enabled: true,
            gmail_user: "ops@example.com".into(),
            gmail_app_password: "secret".into(),
            ..AlertSettings::default()
        };
        config.responders = vec![Responder {
            email: "ana@example.com".into(),
            ..Responder::default()
        }];
        f.config.replace(config);
        f.transport.reply(ANALYZE, 200, json!({"ok": true, "triggered": true, "response": "YES"}));
        f.transport.reply("/api/email-alert", 200, json!({"ok": true}));

        f.scheduler.test_inference().await;

        let sent = f.transport.requests_to("/api/email-alert");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body.as_ref().unwrap()["subject"], "Fall Detector Test Alert");
        assert!(f.sink.alert_counts().is_empty());
        assert_eq!(
            f.sink.statuses_titled(TEST_TITLE).pop().unwrap().detail,
            "Inference completed. Triggered: YES."
        );
    }
}
