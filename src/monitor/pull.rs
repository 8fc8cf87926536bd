//! Background polling of a model download on the appliance.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::{ApiClient, PullStatus};
use crate::events::{EngineEvent, EventSink};

const ENABLE_LOGS: bool = true;
use crate::{log_debug, log_info};

pub const PULL_POLL_INTERVAL: Duration = Duration::from_secs(5);

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Polls the pull-status endpoint until the download finishes, the poller
/// is stopped, or the session closes.
#[derive(Clone)]
pub struct PullStatusPoller {
    api: ApiClient,
    sink: Arc<dyn EventSink>,
    task: Arc<tokio::sync::Mutex<Option<PollTask>>>,
}

impl PullStatusPoller {
    pub fn new(api: ApiClient, sink: Arc<dyn EventSink>) -> Self {
        Self {
            api,
            sink,
            task: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    /// Fetch once and publish progress. `None` when the status is unavailable.
    pub async fn poll_once(&self) -> Option<PullStatus> {
        match self.api.fetch_pull_status().await {
            Ok(status) => {
                self.sink.emit(EngineEvent::PullProgress {
                    in_progress: status.in_progress,
                    status: status.detail(),
                    percent: status.percent(),
                });
                Some(status)
            }
            Err(err) => {
                log_debug!("pull status unavailable: {err:#}");
                None
            }
        }
    }

    /// Start polling. Returns `false` if a poll loop is already running.
    pub async fn start(&self) -> bool {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|running| !running.handle.is_finished()) {
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(self.clone(), cancel.clone()));
        *task = Some(PollTask { cancel, handle });
        log_info!("pull status polling started");
        true
    }

    pub async fn stop(&self) -> bool {
        match self.task.lock().await.take() {
            Some(task) => {
                task.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .map(|task| !task.handle.is_finished())
            .unwrap_or(false)
    }
}

async fn poll_loop(poller: PullStatusPoller, cancel: CancellationToken) {
    let session_closed = poller.api.guard().closed_token();
    let mut ticker = time::interval(PULL_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = session_closed.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if let Some(status) = poller.poll_once().await {
            if !status.in_progress {
                log_info!("model pull finished: {}", status.status);
                break;
            }
        }
    }

    log_debug!("pull status polling exited");
}
