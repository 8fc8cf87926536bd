//! One monitoring engine per operator session, wired together.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

use crate::api::{ApiClient, Transport};
use crate::error::{ArmError, SessionError};
use crate::events::EventSink;
use crate::models::{MonitorConfig, SessionPhase, SharedConfig};
use crate::monitor::{
    ArmedStateController, CycleReport, EngineSnapshot, InferenceTestReport, MonitoringMode,
    PullStatusPoller,
};
use crate::registry::CameraRegistry;
use crate::session::{OperatorPrompt, SessionGuard};

const ENABLE_LOGS: bool = true;
use crate::{log_info, log_warn};

/// Owns the session guard, the camera registry, the shared configuration and
/// the monitoring lifecycle built on top of them.
pub struct MonitorEngine {
    guard: Arc<SessionGuard>,
    registry: Arc<CameraRegistry>,
    config: SharedConfig,
    controller: ArmedStateController,
    pull: PullStatusPoller,
    watching: AtomicBool,
}

impl MonitorEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        token: impl Into<String>,
        operator_name: impl Into<String>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let guard = Arc::new(SessionGuard::new(transport, token, operator_name, sink.clone()));
        let api = ApiClient::new(guard.clone());
        let registry = Arc::new(CameraRegistry::new());
        let config = SharedConfig::default();
        let controller =
            ArmedStateController::new(api.clone(), registry.clone(), config.clone(), sink.clone());
        let pull = PullStatusPoller::new(api, sink);

        Self {
            guard,
            registry,
            config,
            controller,
            pull,
            watching: AtomicBool::new(false),
        }
    }

    pub fn guard(&self) -> &Arc<SessionGuard> {
        &self.guard
    }

    pub fn registry(&self) -> &Arc<CameraRegistry> {
        &self.registry
    }

    pub fn controller(&self) -> &ArmedStateController {
        &self.controller
    }

    pub fn pull_status(&self) -> &PullStatusPoller {
        &self.pull
    }

    /// Claim the session, then pick up the server's armed state and
    /// configuration. Nothing is fetched unless the session became active.
    pub async fn start_session(&self, prompt: &dyn OperatorPrompt) -> SessionPhase {
        if !self.watching.swap(true, Ordering::SeqCst) {
            self.controller.watch_session();
        }

        let phase = self.guard.begin(prompt).await;
        if phase != SessionPhase::Active {
            return phase;
        }

        if let Err(err) = self.controller.reconcile_remote_state().await {
            log_warn!("state reconcile stopped: {err:#}");
        }
        if let Err(err) = self.controller.load_remote_config().await {
            log_warn!("config load stopped: {err:#}");
        }
        self.guard.phase()
    }

    pub fn config(&self) -> MonitorConfig {
        self.config.get().with_selection(self.registry.selection())
    }

    /// Replace the working configuration, cameras included. Takes effect on
    /// the next cycle.
    pub fn set_config(&self, config: MonitorConfig) {
        let selection = config.camera_selection();
        if !selection.cameras.is_empty() {
            self.registry.apply_selection(selection);
        }
        self.config.replace(config);
    }

    pub fn export_config(&self, path: &Path) -> Result<()> {
        self.config().stamped().export_to(path)
    }

    pub fn import_config(&self, path: &Path) -> Result<MonitorConfig> {
        let config = MonitorConfig::import_from(path)?;
        self.set_config(config.clone());
        log_info!("imported configuration from {}", path.display());
        Ok(config)
    }

    pub async fn arm(&self, valid: bool, immediate: bool) -> Result<(), ArmError> {
        self.controller.arm(valid, immediate).await
    }

    pub async fn disarm(&self) -> Result<()> {
        self.controller.disarm().await
    }

    pub async fn save_config(&self, valid: bool) -> Result<()> {
        self.controller.save_config(valid).await
    }

    pub async fn run_once(&self) -> CycleReport {
        self.controller.run_once().await
    }

    /// "Test Inference": one analysis of the selected camera.
    pub async fn test_inference(&self) -> InferenceTestReport {
        self.controller.test_inference().await
    }

    /// "Test Alerts": check the alert settings and send a test email.
    pub async fn test_alert(&self) -> Result<bool, SessionError> {
        self.controller.test_alert().await
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.controller.snapshot()
    }

    /// Disarm if needed and release the session.
    pub async fn close(&self) {
        if self.guard.phase() == SessionPhase::Active {
            if self.controller.mode() != MonitoringMode::Disarmed {
                if let Err(err) = self.controller.disarm().await {
                    log_warn!("disarm on close failed: {err:#}");
                }
            }
            self.pull.stop().await;
            self.guard.close().await;
        }
        self.controller.on_session_lost().await;
    }
}
