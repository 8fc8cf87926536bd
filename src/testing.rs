//! In-process doubles for driving the engine without an appliance.
//!
//! `MockTransport` replays scripted responses per path. Queued replies are
//! consumed in order and the last one keeps answering, so a test only scripts
//! what changes.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::api::{ApiRequest, ApiResponse, Transport};
use crate::error::TransportError;
use crate::events::{EngineEvent, EventSink, StatusEntry};
use crate::monitor::MonitoringMode;
use crate::session::OperatorPrompt;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
enum Scripted {
    Reply(ApiResponse),
    Fail(String),
}

#[derive(Debug, Clone)]
struct Step {
    delay: Option<Duration>,
    outcome: Scripted,
}

#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<Step>>>,
    sent: Mutex<Vec<ApiRequest>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, path: &str, step: Step) {
        locked(&self.routes)
            .entry(path.to_string())
            .or_default()
            .push_back(step);
    }

    pub fn reply(&self, path: &str, status: u16, body: Value) {
        self.reply_raw(path, status, &body.to_string());
    }

    pub fn reply_raw(&self, path: &str, status: u16, body: &str) {
        self.push(
            path,
            Step {
                delay: None,
                outcome: Scripted::Reply(ApiResponse::new(status, body)),
            },
        );
    }

    /// Reply only after `delay` has elapsed on the tokio clock.
    pub fn reply_after(&self, path: &str, delay: Duration, status: u16, body: Value) {
        self.push(
            path,
            Step {
                delay: Some(delay),
                outcome: Scripted::Reply(ApiResponse::json_body(status, body)),
            },
        );
    }

    /// Fail below HTTP, as an unreachable host would.
    pub fn fail(&self, path: &str, message: &str) {
        self.push(
            path,
            Step {
                delay: None,
                outcome: Scripted::Fail(message.to_string()),
            },
        );
    }

    /// Drop everything scripted for `path`.
    pub fn clear(&self, path: &str) {
        locked(&self.routes).remove(path);
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        locked(&self.sent).clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        locked(&self.sent)
            .iter()
            .filter(|request| request.path == path)
            .cloned()
            .collect()
    }

    pub fn request_count(&self) -> usize {
        locked(&self.sent).len()
    }

    /// Highest number of requests that were in flight at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self, path: &str) -> Option<Step> {
        let mut routes = locked(&self.routes);
        let queue = routes.get_mut(path)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let step = self.next_step(&request.path);
        locked(&self.sent).push(request.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let Some(step) = step else {
            return Ok(ApiResponse::json_body(
                404,
                json!({"ok": false, "error": format!("no scripted reply for {}", request.path)}),
            ));
        };

        if let Some(delay) = step.delay {
            tokio::time::sleep(delay).await;
        }

        match step.outcome {
            Scripted::Reply(response) => Ok(response),
            Scripted::Fail(message) => Err(TransportError(message)),
        }
    }
}

/// Records every event it is handed.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<EngineEvent> {
        locked(&self.events).clone()
    }

    pub fn clear(&self) {
        locked(&self.events).clear();
    }

    pub fn statuses(&self) -> Vec<StatusEntry> {
        locked(&self.events)
            .iter()
            .filter_map(|event| match event {
                EngineEvent::Status(entry) => Some(entry.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn statuses_titled(&self, title: &str) -> Vec<StatusEntry> {
        self.statuses()
            .into_iter()
            .filter(|entry| entry.title == title)
            .collect()
    }

    pub fn blocked_messages(&self) -> Vec<String> {
        locked(&self.events)
            .iter()
            .filter_map(|event| match event {
                EngineEvent::SessionBlocked { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn mode_changes(&self) -> Vec<MonitoringMode> {
        locked(&self.events)
            .iter()
            .filter_map(|event| match event {
                EngineEvent::ModeChanged { mode } => Some(*mode),
                _ => None,
            })
            .collect()
    }

    pub fn alert_counts(&self) -> Vec<u32> {
        locked(&self.events)
            .iter()
            .filter_map(|event| match event {
                EngineEvent::AlertCount { count } => Some(*count),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: EngineEvent) {
        locked(&self.events).push(event);
    }
}

/// Answers takeover questions with a fixed reply and remembers who was named.
pub struct ScriptedPrompt {
    answer: bool,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        locked(&self.asked).clone()
    }
}

#[async_trait]
impl OperatorPrompt for ScriptedPrompt {
    async fn confirm_takeover(&self, active_user: &str) -> bool {
        locked(&self.asked).push(active_user.to_string());
        self.answer
    }
}
