use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Local;
use tokio::time::Instant;

use crate::api::{ApiClient, DeliveryOutcome};
use crate::error::SessionError;
use crate::events::{emit_status, EngineEvent, EventSink, StatusLevel};
use crate::models::{is_valid_email, CameraTarget, InferenceResult, MonitorConfig, SharedConfig};

use super::dedup::{DedupKey, DedupTable};
use super::email::{build_email, AlertContext};

const ENABLE_LOGS: bool = true;
use crate::{log_debug, log_info, log_warn};

const ANALYSIS_TITLE: &str = "Ollama analysis";
const EMAIL_TITLE: &str = "Email alert";
const ALERT_TEST_TITLE: &str = "Alert test";
const RESPONSE_LOG_TITLE: &str = "Response log";

/// Turns inference results into alerts and deduplicated error entries.
pub struct AlertDispatcher {
    api: ApiClient,
    config: SharedConfig,
    sink: Arc<dyn EventSink>,
    alert_count: AtomicU32,
    dedup: Mutex<DedupTable>,
}

impl AlertDispatcher {
    pub fn new(api: ApiClient, config: SharedConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            api,
            config,
            sink,
            alert_count: AtomicU32::new(0),
            dedup: Mutex::new(DedupTable::default()),
        }
    }

    pub fn alert_count(&self) -> u32 {
        self.alert_count.load(Ordering::SeqCst)
    }

    /// Start a new arming period: zero the counter and forget past errors.
    pub fn reset(&self) {
        self.alert_count.store(0, Ordering::SeqCst);
        self.dedup
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        self.sink.emit(EngineEvent::AlertCount { count: 0 });
    }

    fn surfaces(&self, key: DedupKey, message: &str) -> bool {
        self.dedup
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .should_surface(key, message, Instant::now())
    }

    /// Report a failed analysis, at most once per window per camera and message.
    pub fn report_failure(&self, camera: &CameraTarget, result: &InferenceResult, monitor_all: bool) {
        let message = result.error_message();
        let detail = if monitor_all {
            format!("{}: {message}", camera.label())
        } else {
            message.to_string()
        };

        if self.surfaces(DedupKey::analysis(&camera.id), &detail) {
            emit_status(self.sink.as_ref(), ANALYSIS_TITLE, StatusLevel::Error, detail);
        } else {
            log_debug!("suppressed repeated analysis error for {}", camera.label());
        }
    }

    /// Handle a successful analysis. Only a closed session is an error.
    pub async fn handle_success(
        &self,
        camera: &CameraTarget,
        result: &InferenceResult,
    ) -> Result<(), SessionError> {
        if !result.triggered {
            return Ok(());
        }

        let count = self.alert_count.fetch_add(1, Ordering::SeqCst) + 1;
        log_info!("fall detected on {} (alert #{count})", camera.label());
        self.sink.emit(EngineEvent::AlertCount { count });

        let config = self.config.get();
        if !config.alerts.email_enabled {
            return Ok(());
        }

        let context = AlertContext::fall_detected(camera, result);
        match self.deliver(&config, &context).await? {
            DeliveryOutcome::Sent => emit_status(
                self.sink.as_ref(),
                EMAIL_TITLE,
                StatusLevel::Ok,
                format!("Email sent for {}.", camera.label()),
            ),
            DeliveryOutcome::Failed(message) => {
                if self.surfaces(DedupKey::email(), &message) {
                    emit_status(self.sink.as_ref(), EMAIL_TITLE, StatusLevel::Error, message);
                } else {
                    log_debug!("suppressed repeated email failure");
                }
            }
        }
        Ok(())
    }

    /// Email for a trigger seen by an inference test. The alert counter is
    /// left alone and failures are never deduplicated.
    pub async fn send_inference_test_email(
        &self,
        camera: &CameraTarget,
        result: &InferenceResult,
    ) -> Result<(), SessionError> {
        let config = self.config.get();
        if !config.alerts.email_enabled {
            return Ok(());
        }

        let context = AlertContext::inference_test(camera, result);
        match self.deliver(&config, &context).await? {
            DeliveryOutcome::Sent => {
                emit_status(self.sink.as_ref(), EMAIL_TITLE, StatusLevel::Ok, "Email sent.")
            }
            DeliveryOutcome::Failed(message) => {
                emit_status(self.sink.as_ref(), EMAIL_TITLE, StatusLevel::Error, message)
            }
        }
        Ok(())
    }

    /// Check every alert field, then send a canned test email.
    ///
    /// Returns whether the email went out. Only a closed session is an error.
    pub async fn test_alert(&self, camera: Option<&CameraTarget>) -> Result<bool, SessionError> {
        let config = self.config.get();
        let alerts = &config.alerts;
        if !alerts.email_enabled {
            emit_status(
                self.sink.as_ref(),
                ALERT_TEST_TITLE,
                StatusLevel::Warn,
                "Enable at least one alert channel first.",
            );
            return Ok(false);
        }

        let mut issues = Vec::new();
        if config.recipients().is_empty() {
            issues.push("email responders");
        }
        if !is_valid_email(alerts.gmail_user.trim()) {
            issues.push("Gmail account email");
        }
        if alerts.gmail_app_password.trim().is_empty() {
            issues.push("Gmail app password");
        }
        if !is_valid_email(alerts.sender_email.trim()) {
            issues.push("sender email");
        }
        if !issues.is_empty() {
            emit_status(
                self.sink.as_ref(),
                ALERT_TEST_TITLE,
                StatusLevel::Warn,
                format!("Missing {}.", issues.join(", ")),
            );
            return Ok(false);
        }

        let context = AlertContext::test_alert(camera);
        match self.deliver(&config, &context).await? {
            DeliveryOutcome::Sent => {
                log_info!("alert test delivered");
                emit_status(
                    self.sink.as_ref(),
                    ALERT_TEST_TITLE,
                    StatusLevel::Ok,
                    "Alert test sent to email responders.",
                );
                Ok(true)
            }
            DeliveryOutcome::Failed(message) => {
                emit_status(self.sink.as_ref(), ALERT_TEST_TITLE, StatusLevel::Error, message);
                Ok(false)
            }
        }
    }

    /// Report a failed response-log refresh, deduplicated like analysis errors.
    pub fn report_response_log_failure(&self, message: &str) {
        log_warn!("response log refresh failed: {message}");
        if self.surfaces(DedupKey::response_log(), message) {
            emit_status(
                self.sink.as_ref(),
                RESPONSE_LOG_TITLE,
                StatusLevel::Warn,
                format!("Unable to refresh the response log: {message}"),
            );
        }
    }

    async fn deliver(
        &self,
        config: &MonitorConfig,
        context: &AlertContext,
    ) -> Result<DeliveryOutcome, SessionError> {
        match build_email(&config.alerts, config.recipients(), context, Local::now()) {
            Ok(payload) => self.api.send_email(&payload).await,
            Err(reason) => Ok(DeliveryOutcome::Failed(reason)),
        }
    }
}
