use serde::Serialize;

use crate::error::SessionError;

use super::{snippet, ApiClient, ApiRequest};

const EMAIL_PATH: &str = "/api/email-alert";

/// Body of `POST /api/email-alert`.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct EmailPayload {
    pub smtp_user: String,
    pub smtp_password: String,
    pub sender_email: String,
    pub sender_name: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub image_b64: String,
    pub image_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    Failed(String),
}

impl ApiClient {
    /// Hand an alert to the email service. Only a closed session is an `Err`.
    pub async fn send_email(&self, payload: &EmailPayload) -> Result<DeliveryOutcome, SessionError> {
        let body = match serde_json::to_value(payload) {
            Ok(body) => body,
            Err(err) => return Ok(DeliveryOutcome::Failed(err.to_string())),
        };

        let response = match self.guard.guarded_fetch(ApiRequest::post(EMAIL_PATH, body)).await {
            Ok(response) => response,
            Err(SessionError::Network(message)) => {
                return Ok(DeliveryOutcome::Failed(format!(
                    "Failed to reach email service: {message}"
                )));
            }
            Err(closed) => return Err(closed),
        };

        let accepted = response
            .json_object()
            .and_then(|payload| payload.get("ok").and_then(|ok| ok.as_bool()))
            .unwrap_or(false);
        if response.is_success() && accepted {
            return Ok(DeliveryOutcome::Sent);
        }

        if let Some(error) = response.field_str("error") {
            return Ok(DeliveryOutcome::Failed(error));
        }

        let detail = snippet(&response.body, 200);
        let message = if detail.is_empty() {
            format!("HTTP {}.", response.status)
        } else {
            format!("HTTP {}. {detail}", response.status)
        };
        Ok(DeliveryOutcome::Failed(message))
    }
}
