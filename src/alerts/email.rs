use chrono::{DateTime, Local};

use crate::api::EmailPayload;
use crate::models::{is_valid_email, AlertSettings, CameraTarget, InferenceResult};

pub const ALERT_EVENT: &str = "fall_detected";
pub const ALERT_SUBJECT: &str = "Fall Detector Alert";
pub const INFERENCE_TEST_EVENT: &str = "inference_test";
pub const TEST_ALERT_EVENT: &str = "test_alert";
pub const TEST_SUBJECT: &str = "Fall Detector Test Alert";
const TEST_ALERT_TEXT: &str = "This is a test email from the fall detector control room.";
const DEFAULT_CAMERA_MODEL: &str = "Tapo C210";

/// What an alert is about.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlertContext {
    pub event: String,
    pub subject: String,
    pub camera_name: String,
    pub camera_model: String,
    pub response_text: String,
    pub image_base64: Option<String>,
    pub image_type: Option<String>,
}

impl AlertContext {
    pub fn fall_detected(camera: &CameraTarget, result: &InferenceResult) -> Self {
        Self::from_result(ALERT_EVENT, ALERT_SUBJECT, camera, result)
    }

    /// A trigger seen by a one-off operator inference test.
    pub fn inference_test(camera: &CameraTarget, result: &InferenceResult) -> Self {
        Self::from_result(INFERENCE_TEST_EVENT, TEST_SUBJECT, camera, result)
    }

    /// Canned message for the alert-channel test; no inference involved.
    pub fn test_alert(camera: Option<&CameraTarget>) -> Self {
        Self {
            event: TEST_ALERT_EVENT.into(),
            subject: TEST_SUBJECT.into(),
            camera_name: camera.map(|c| c.name.trim().to_string()).unwrap_or_default(),
            camera_model: camera.map(|c| c.model.trim().to_string()).unwrap_or_default(),
            response_text: TEST_ALERT_TEXT.into(),
            ..Self::default()
        }
    }

    fn from_result(event: &str, subject: &str, camera: &CameraTarget, result: &InferenceResult) -> Self {
        Self {
            event: event.into(),
            subject: subject.into(),
            camera_name: camera.name.trim().to_string(),
            camera_model: camera.model.trim().to_string(),
            response_text: result.response_text.clone(),
            image_base64: result.image_base64.clone(),
            image_type: result.image_type.clone(),
        }
    }
}

pub fn email_body(context: &AlertContext, at: DateTime<Local>) -> String {
    let event = non_empty(&context.event).unwrap_or("alert");
    let name = non_empty(&context.camera_name).unwrap_or("Camera");
    let model = non_empty(&context.camera_model).unwrap_or(DEFAULT_CAMERA_MODEL);

    let mut lines = vec![
        format!("Event: {event}"),
        format!("Time: {}", at.format("%Y-%m-%d %H:%M:%S")),
        format!("Camera: {name} ({model})"),
    ];
    if !context.response_text.is_empty() {
        lines.push(String::new());
        lines.push("Inference:".into());
        lines.push(context.response_text.clone());
    }
    lines.join("\n")
}

/// Build the email request, or the reason it cannot be sent.
pub fn build_email(
    settings: &AlertSettings,
    recipients: Vec<String>,
    context: &AlertContext,
    at: DateTime<Local>,
) -> Result<EmailPayload, String> {
    let smtp_user = settings.gmail_user.trim();
    let smtp_password = settings.gmail_app_password.trim();
    let sender_email = non_empty(&settings.sender_email).unwrap_or(smtp_user);

    if smtp_user.is_empty() || smtp_password.is_empty() {
        return Err("Missing Gmail credentials.".into());
    }
    if !is_valid_email(sender_email) {
        return Err("Missing sender email.".into());
    }
    if recipients.is_empty() {
        return Err("No responder emails configured.".into());
    }

    Ok(EmailPayload {
        smtp_user: smtp_user.to_string(),
        smtp_password: smtp_password.to_string(),
        sender_email: sender_email.to_string(),
        sender_name: settings.gmail_sender_name.trim().to_string(),
        recipients,
        subject: non_empty(&context.subject).unwrap_or(ALERT_SUBJECT).to_string(),
        body: email_body(context, at),
        image_b64: context.image_base64.clone().unwrap_or_default(),
        image_type: context.image_type.clone().unwrap_or_default(),
    })
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap()
    }

    fn settings() -> AlertSettings {
        AlertSettings {
            email_enabled: true,
            sender_email: String::new(),
            gmail_user: "ops@example.com".into(),
            gmail_app_password: "app-pass".into(),
            gmail_sender_name: "Fall Detector".into(),
        }
    }

    #[test]
    fn body_lists_event_time_camera_and_inference() {
        let context = AlertContext {
            event: ALERT_EVENT.into(),
            camera_name: "Hall".into(),
            response_text: "YES, person on the floor".into(),
            ..AlertContext::default()
        };

        assert_eq!(
            email_body(&context, at()),
            "Event: fall_detected\nTime: 2026-10-16 09:30:00\nCamera: Hall (Tapo C210)\n\nInference:\nYES, person on the floor"
        );
    }

    #[test]
    fn body_without_response_has_no_inference_section() {
        let body = email_body(&AlertContext::default(), at());
        assert_eq!(body, "Event: alert\nTime: 2026-10-16 09:30:00\nCamera: Camera (Tapo C210)");
    }

    #[test]
    fn test_alert_body_carries_the_canned_text() {
        let context = AlertContext::test_alert(None);
        let payload = build_email(&settings(), vec!["ana@example.com".into()], &context, at()).unwrap();

        assert_eq!(payload.subject, TEST_SUBJECT);
        assert_eq!(
            payload.body,
            "Event: test_alert\nTime: 2026-10-16 09:30:00\nCamera: Camera (Tapo C210)\n\nInference:\nThis is a test email from the fall detector control room."
        );
    }

    #[test]
    fn sender_defaults_to_smtp_user() {
        let payload = build_email(
            &settings(),
            vec!["ana@example.com".into()],
            &AlertContext::default(),
            at(),
        )
        .unwrap();

        assert_eq!(payload.sender_email, "ops@example.com");
        assert_eq!(payload.subject, ALERT_SUBJECT);
        assert_eq!(payload.image_type, "");
    }

    #[test]
    fn preflight_checks_mirror_the_alert_service() {
        let recipients = vec!["ana@example.com".to_string()];
        let context = AlertContext::default();

        let mut missing_password = settings();
        missing_password.gmail_app_password = " ".into();
        assert_eq!(
            build_email(&missing_password, recipients.clone(), &context, at()),
            Err("Missing Gmail credentials.".into())
        );

        let mut bad_sender = settings();
        bad_sender.sender_email = "not-an-address".into();
        assert_eq!(
            build_email(&bad_sender, recipients, &context, at()),
            Err("Missing sender email.".into())
        );

        assert_eq!(
            build_email(&settings(), Vec::new(), &context, at()),
            Err("No responder emails configured.".into())
        );
    }
}
