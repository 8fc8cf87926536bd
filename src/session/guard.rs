//! Single-operator session arbitration.
//!
//! Every guarded call waits until session establishment has settled, carries
//! the session token, and turns a 401/403 into a blocked session before the
//! caller ever sees the response.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiRequest, ApiResponse, Transport};
use crate::error::SessionError;
use crate::events::{EngineEvent, EventSink};
use crate::models::{Session, SessionPhase};

use super::prompt::OperatorPrompt;

const ENABLE_LOGS: bool = true;
use crate::{log_debug, log_info, log_warn};

pub const SESSION_HEADER: &str = "X-Session-Token";

const START_PATH: &str = "/api/session/start";
const TAKEOVER_PATH: &str = "/api/session/takeover";
const CLOSE_PATH: &str = "/api/session/close";

const NAME_REQUIRED: &str = "Session closed. Name is required for access.";
const UNREACHABLE: &str = "Unable to reach the session service.";
const START_FAILED: &str = "Unable to start a session.";
const TAKEOVER_FAILED: &str = "Unable to take over the active monitoring session.";
const CLOSED: &str = "Session closed.";

pub struct SessionGuard {
    transport: Arc<dyn Transport>,
    token: String,
    operator_name: String,
    phase: watch::Sender<SessionPhase>,
    closed: CancellationToken,
    sink: Arc<dyn EventSink>,
}

impl SessionGuard {
    pub fn new(
        transport: Arc<dyn Transport>,
        token: impl Into<String>,
        operator_name: impl Into<String>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Pending);
        Self {
            transport,
            token: token.into(),
            operator_name: operator_name.into().trim().to_string(),
            phase,
            closed: CancellationToken::new(),
            sink,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn operator_name(&self) -> &str {
        &self.operator_name
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.borrow().clone()
    }

    pub fn is_blocked(&self) -> bool {
        self.phase.borrow().is_blocked()
    }

    pub fn session(&self) -> Session {
        Session {
            token: self.token.clone(),
            operator_name: self.operator_name.clone(),
            active: *self.phase.borrow() == SessionPhase::Active,
        }
    }

    /// Cancelled once, when the session becomes blocked.
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Establish the session. Runs at most once; later calls report the
    /// settled phase.
    pub async fn begin(&self, prompt: &dyn OperatorPrompt) -> SessionPhase {
        if self.phase.borrow().is_settled() {
            return self.phase();
        }

        if self.operator_name.is_empty() {
            self.block(NAME_REQUIRED);
            return self.phase();
        }

        let body = json!({ "token": self.token, "name": self.operator_name });
        match self.transport.send(ApiRequest::post(START_PATH, body)).await {
            Err(err) => {
                log_warn!("session start failed to reach the server: {err}");
                self.block(UNREACHABLE);
            }
            Ok(response) if response.status == 409 => {
                let active_user = response
                    .field_str("active_user")
                    .unwrap_or_else(|| "another operator".to_string());
                log_info!("session conflict: {active_user} is the active operator");

                if prompt.confirm_takeover(&active_user).await {
                    self.take_over().await;
                } else {
                    self.block(format!(
                        "{active_user} is currently monitoring. Your session has been closed."
                    ));
                }
            }
            Ok(response) if !response.is_success() => {
                self.block(
                    response
                        .field_str("error")
                        .unwrap_or_else(|| START_FAILED.to_string()),
                );
            }
            Ok(_) => self.activate(),
        }

        self.phase()
    }

    async fn take_over(&self) {
        let body = json!({
            "token": self.token,
            "name": self.operator_name,
            "confirm": true,
        });

        match self.transport.send(ApiRequest::post(TAKEOVER_PATH, body)).await {
            Err(err) => {
                log_warn!("session takeover failed to reach the server: {err}");
                self.block(UNREACHABLE);
            }
            Ok(response) => {
                let accepted = response.is_success()
                    && response
                        .json_object()
                        .and_then(|payload| payload.get("ok").and_then(|ok| ok.as_bool()))
                        .unwrap_or(false);
                if accepted {
                    log_info!("{} took over the monitoring session", self.operator_name);
                    self.activate();
                } else {
                    self.block(
                        response
                            .field_str("error")
                            .unwrap_or_else(|| TAKEOVER_FAILED.to_string()),
                    );
                }
            }
        }
    }

    fn activate(&self) {
        self.phase.send_modify(|phase| {
            if *phase == SessionPhase::Pending {
                *phase = SessionPhase::Active;
            }
        });
        log_info!("session active for {}", self.operator_name);
    }

    /// Wait for session establishment to settle, then report the phase.
    pub async fn wait_settled(&self) -> SessionPhase {
        let mut rx = self.phase.subscribe();
        let phase = match rx.wait_for(SessionPhase::is_settled).await {
            Ok(phase) => phase.clone(),
            Err(_) => SessionPhase::Blocked(CLOSED.to_string()),
        };
        phase
    }

    /// Perform a call on behalf of the active operator.
    pub async fn guarded_fetch(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        if let SessionPhase::Blocked(message) = self.wait_settled().await {
            return Err(SessionError::Closed(message));
        }

        let request = request.with_header(SESSION_HEADER, self.token.clone());
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|err| SessionError::Network(err.0))?;

        if response.status == 401 || response.status == 403 {
            let message = rejection_message(&response);
            self.block(message.clone());
            return Err(SessionError::Closed(message));
        }

        Ok(response)
    }

    /// Block the session: stop everything hanging off `closed_token` and ask
    /// the UI to cover the application. The first reason wins.
    pub fn block(&self, message: impl Into<String>) {
        let message = message.into();
        let mut newly_blocked = false;
        self.phase.send_modify(|phase| {
            if !phase.is_blocked() {
                *phase = SessionPhase::Blocked(message.clone());
                newly_blocked = true;
            }
        });

        if !newly_blocked {
            log_debug!("session already blocked; ignoring '{message}'");
            return;
        }

        self.closed.cancel();
        log_warn!("session blocked: {message}");
        self.sink.emit(EngineEvent::SessionBlocked { message });
    }

    /// Leave deliberately: tell the server, then block locally.
    pub async fn close(&self) {
        if *self.phase.borrow() == SessionPhase::Active {
            let body = json!({ "token": self.token });
            if let Err(err) = self.guarded_fetch(ApiRequest::post(CLOSE_PATH, body)).await {
                log_warn!("session close was not acknowledged: {err}");
            }
        }
        self.block(CLOSED);
    }
}

fn rejection_message(response: &ApiResponse) -> String {
    if response.json_object().is_none() {
        return CLOSED.to_string();
    }
    if let Some(kicked_by) = response.field_str("kicked_by") {
        return format!("You have been logged off by {kicked_by}.");
    }
    if let Some(active_user) = response.field_str("active_user") {
        return format!("{active_user} is currently monitoring. Your session has been closed.");
    }
    response
        .field_str("error")
        .unwrap_or_else(|| CLOSED.to_string())
}
