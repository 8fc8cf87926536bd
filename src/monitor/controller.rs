use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::alerts::AlertDispatcher;
use crate::api::ApiClient;
use crate::error::{ArmError, SessionError};
use crate::events::{emit_status, EventSink, StatusLevel};
use crate::models::{RemoteState, SharedConfig};
use crate::registry::CameraRegistry;

use super::scheduler::{AnalysisScheduler, CycleReport, InferenceTestReport};
use super::state::{ModeCell, ModeEvent, MonitoringMode};

const ENABLE_LOGS: bool = true;
use crate::{log_info, log_warn};

const ARM_TITLE: &str = "Save & Arm";
const SAVE_TITLE: &str = "Save";
const DISARM_TITLE: &str = "Disarm";
const SERVER_CONFIG_TITLE: &str = "Server config";
const SERVER_STATE_TITLE: &str = "Server state";

/// Point-in-time view of the engine for display.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub mode: MonitoringMode,
    pub alert_count: u32,
    pub armed_by: Option<String>,
    pub armed_at: Option<DateTime<Utc>>,
    pub timeout_streak: u32,
    pub inference_active: bool,
}

fn is_session_closed(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SessionError>()
        .map(SessionError::is_closed)
        .unwrap_or(false)
}

/// Owns the Disarmed / Armed / Paused lifecycle and the side effects of
/// moving between them.
#[derive(Clone)]
pub struct ArmedStateController {
    api: ApiClient,
    mode: ModeCell,
    scheduler: AnalysisScheduler,
    dispatcher: Arc<AlertDispatcher>,
    registry: Arc<CameraRegistry>,
    config: SharedConfig,
    sink: Arc<dyn EventSink>,
}

impl ArmedStateController {
    pub fn new(
        api: ApiClient,
        registry: Arc<CameraRegistry>,
        config: SharedConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let mode = ModeCell::new(sink.clone());
        let dispatcher = Arc::new(AlertDispatcher::new(api.clone(), config.clone(), sink.clone()));
        let scheduler = AnalysisScheduler::new(
            api.clone(),
            registry.clone(),
            config.clone(),
            dispatcher.clone(),
            mode.clone(),
            sink.clone(),
        );

        Self {
            api,
            mode,
            scheduler,
            dispatcher,
            registry,
            config,
            sink,
        }
    }

    pub fn mode(&self) -> MonitoringMode {
        self.mode.mode()
    }

    pub fn scheduler(&self) -> &AnalysisScheduler {
        &self.scheduler
    }

    /// Save the configuration and arm (or resume from a pause).
    ///
    /// `valid` is the verdict of form validation, which happens elsewhere.
    pub async fn arm(&self, valid: bool, immediate: bool) -> Result<(), ArmError> {
        if self.api.guard().is_blocked() {
            return Err(ArmError::SessionClosed);
        }
        if !valid {
            emit_status(
                self.sink.as_ref(),
                ARM_TITLE,
                StatusLevel::Error,
                ArmError::Invalid.to_string(),
            );
            return Err(ArmError::Invalid);
        }
        if self.mode.mode().is_armed() {
            return Err(ArmError::AlreadyArmed);
        }

        self.persist_config()
            .await
            .map_err(|_| ArmError::SessionClosed)?;

        self.dispatcher.reset();
        self.scheduler.reset_breaker();
        if self.mode.apply(ModeEvent::Arm).is_none() {
            return Err(ArmError::AlreadyArmed);
        }
        self.mode.record_arming(
            Some(self.api.guard().operator_name().to_string()),
            Some(Utc::now()),
        );

        self.publish_armed(true)
            .await
            .map_err(|_| ArmError::SessionClosed)?;

        emit_status(
            self.sink.as_ref(),
            ARM_TITLE,
            StatusLevel::Ok,
            "Configuration saved on server. Monitoring armed.",
        );
        self.scheduler.start(immediate).await;
        Ok(())
    }

    /// Operator disarm: stop cycles, clear the pause, tell the state service.
    pub async fn disarm(&self) -> Result<()> {
        self.scheduler.stop().await;
        self.mode.apply(ModeEvent::OperatorDisarm);
        self.scheduler.clear_inference_active();
        self.scheduler.reset_breaker();

        self.publish_armed(false).await?;
        emit_status(self.sink.as_ref(), DISARM_TITLE, StatusLevel::Ok, "Monitoring stopped.");
        Ok(())
    }

    /// Save the configuration without arming.
    pub async fn save_config(&self, valid: bool) -> Result<()> {
        if !valid {
            let message = "Fix errors before saving the configuration.";
            emit_status(self.sink.as_ref(), SAVE_TITLE, StatusLevel::Error, message);
            return Err(anyhow!(message));
        }

        if self.persist_config().await? {
            emit_status(
                self.sink.as_ref(),
                SAVE_TITLE,
                StatusLevel::Ok,
                "Configuration saved on server.",
            );
        }
        Ok(())
    }

    /// Pull the stored configuration into the registry and settings.
    /// Returns `false` when the server holds none.
    pub async fn load_remote_config(&self) -> Result<bool> {
        match self.api.fetch_config().await {
            Ok(Some(config)) => {
                let selection = config.camera_selection();
                if !selection.cameras.is_empty() {
                    self.registry.apply_selection(selection);
                }
                self.config.replace(config);
                log_info!("loaded configuration from server");
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(err) if is_session_closed(&err) => Err(err),
            Err(err) => {
                log_warn!("config fetch failed: {err:#}");
                emit_status(
                    self.sink.as_ref(),
                    SERVER_CONFIG_TITLE,
                    StatusLevel::Warn,
                    "Unable to sync configuration with the server.",
                );
                Ok(false)
            }
        }
    }

    /// Align with the state service. A remote disarm stops local monitoring;
    /// a remote arm is only recorded for display.
    pub async fn reconcile_remote_state(&self) -> Result<Option<RemoteState>> {
        let remote = match self.api.fetch_state().await {
            Ok(remote) => remote,
            Err(err) if is_session_closed(&err) => return Err(err),
            Err(err) => {
                log_warn!("state fetch failed: {err:#}");
                emit_status(
                    self.sink.as_ref(),
                    SERVER_STATE_TITLE,
                    StatusLevel::Warn,
                    "Unable to sync armed state with the server.",
                );
                return Ok(None);
            }
        };

        if remote.armed {
            self.mode.record_arming(
                remote.armed_by().map(str::to_string),
                remote.armed_at_utc(),
            );
        } else if self.mode.mode() != MonitoringMode::Disarmed {
            self.scheduler.stop().await;
            self.mode.apply(ModeEvent::RemoteDisarmed);
            self.scheduler.clear_inference_active();
            self.scheduler.reset_breaker();
        }
        Ok(Some(remote))
    }

    pub async fn run_once(&self) -> CycleReport {
        self.scheduler.run_once().await
    }

    pub async fn test_inference(&self) -> InferenceTestReport {
        self.scheduler.test_inference().await
    }

    /// Send a test email about the selected camera.
    pub async fn test_alert(&self) -> Result<bool, SessionError> {
        self.dispatcher.test_alert(self.registry.active().as_ref()).await
    }

    /// Stop everything locally after the session was lost.
    pub async fn on_session_lost(&self) {
        self.scheduler.stop().await;
        self.mode.apply(ModeEvent::SessionLost);
        self.scheduler.clear_inference_active();
    }

    /// Disarm automatically once the session closes.
    pub fn watch_session(&self) -> JoinHandle<()> {
        let closed = self.api.guard().closed_token();
        let controller = self.clone();
        tokio::spawn(async move {
            closed.cancelled().await;
            controller.on_session_lost().await;
        })
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let state = self.mode.state();
        EngineSnapshot {
            mode: state.mode,
            alert_count: self.dispatcher.alert_count(),
            armed_by: state.armed_by,
            armed_at: state.armed_at,
            timeout_streak: self.scheduler.timeout_streak(),
            inference_active: self.scheduler.inference_active(),
        }
    }

    /// Store the current configuration remotely. `Ok(false)` means the
    /// server did not take it; only a closed session is an error.
    async fn persist_config(&self) -> Result<bool> {
        let config = self
            .config
            .get()
            .with_selection(self.registry.selection())
            .stamped();

        match self.api.store_config(&config).await {
            Ok(()) => {
                self.config.replace(config);
                Ok(true)
            }
            Err(err) if is_session_closed(&err) => Err(err),
            Err(err) => {
                log_warn!("config save failed: {err:#}");
                emit_status(
                    self.sink.as_ref(),
                    SERVER_CONFIG_TITLE,
                    StatusLevel::Warn,
                    "Unable to sync configuration with the server.",
                );
                Ok(false)
            }
        }
    }

    async fn publish_armed(&self, armed: bool) -> Result<()> {
        let operator = self.api.guard().operator_name().to_string();
        match self.api.publish_state(armed, &operator).await {
            Ok(remote) => {
                if armed {
                    self.mode.record_arming(
                        remote.armed_by().map(str::to_string).or(Some(operator)),
                        remote.armed_at_utc().or_else(|| Some(Utc::now())),
                    );
                }
                Ok(())
            }
            Err(err) if is_session_closed(&err) => Err(err),
            Err(err) => {
                log_warn!("state publish failed: {err:#}");
                emit_status(
                    self.sink.as_ref(),
                    SERVER_STATE_TITLE,
                    StatusLevel::Warn,
                    "Unable to sync armed state with the server.",
                );
                Ok(())
            }
        }
    }
}
