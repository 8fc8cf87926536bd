use serde::{Deserialize, Serialize};

use crate::error::{classify_inference_error, InferenceErrorKind};

use super::{CameraTarget, InferenceSettings, PreviewMode};

/// One analysis request for one camera, shaped as the inference service reads it.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceRequest {
    pub host: String,
    pub port: u16,
    pub model: String,
    pub prompt: String,
    pub trigger: String,
    pub timeout_seconds: u64,
    pub stream_url: String,
    pub preview_url: String,
    pub preview_mode: PreviewMode,
    pub camera_id: String,
    pub camera_name: String,
    pub camera_model: String,
}

impl InferenceRequest {
    pub fn for_camera(settings: &InferenceSettings, camera: &CameraTarget) -> Self {
        Self {
            host: settings.host.trim().to_string(),
            port: settings.port,
            model: settings.model.trim().to_string(),
            prompt: settings.prompt.trim().to_string(),
            trigger: settings.trigger.trim().to_string(),
            timeout_seconds: settings.effective_timeout_secs(),
            stream_url: camera.stream_url.clone(),
            preview_url: camera.preview_url.clone(),
            preview_mode: camera.preview_mode,
            camera_id: camera.id.clone(),
            camera_name: camera.name.clone(),
            camera_model: camera.model.clone(),
        }
    }
}

/// Outcome of one analysis, after network failures have been folded in.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResult {
    pub ok: bool,
    pub triggered: bool,
    pub response_text: String,
    pub image_base64: Option<String>,
    pub image_type: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<InferenceErrorKind>,
}

impl InferenceResult {
    pub fn success(triggered: bool, response_text: impl Into<String>) -> Self {
        Self {
            ok: true,
            triggered,
            response_text: response_text.into(),
            image_base64: None,
            image_type: None,
            error: None,
            error_kind: None,
        }
    }

    /// A failure; `unreachable` marks calls that never got an HTTP answer.
    pub fn failure(message: impl Into<String>, unreachable: bool) -> Self {
        let message = message.into();
        let kind = classify_inference_error(&message, unreachable);
        Self {
            ok: false,
            triggered: false,
            response_text: String::new(),
            image_base64: None,
            image_type: None,
            error: Some(message),
            error_kind: Some(kind),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.error_kind == Some(InferenceErrorKind::Timeout)
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("Ollama analysis failed.")
    }
}

/// Body returned by `POST /api/ollama-analyze`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AnalyzeResponse {
    pub ok: bool,
    pub triggered: bool,
    pub response: String,
    pub image: Option<String>,
    pub image_type: Option<String>,
    pub error: Option<String>,
}

impl From<AnalyzeResponse> for InferenceResult {
    fn from(payload: AnalyzeResponse) -> Self {
        if !payload.ok {
            let message = payload
                .error
                .filter(|error| !error.trim().is_empty())
                .unwrap_or_else(|| "Ollama analysis failed.".to_string());
            return InferenceResult::failure(message, false);
        }

        InferenceResult {
            ok: true,
            triggered: payload.triggered,
            response_text: payload.response,
            image_base64: payload.image.filter(|image| !image.is_empty()),
            image_type: payload.image_type.filter(|kind| !kind.is_empty()),
            error: None,
            error_kind: None,
        }
    }
}

/// One entry of the externally stored response log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ResponseLogEntry {
    pub timestamp: f64,
    pub text: String,
    pub model: String,
    pub triggered: bool,
    pub camera_id: String,
    pub camera_name: String,
    pub camera_model: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_matches_service_field_names() {
        let settings = InferenceSettings {
            host: " gpu.local ".into(),
            port: 11434,
            model: "llava".into(),
            prompt: "Fall?".into(),
            trigger: "YES".into(),
            ..InferenceSettings::default()
        };
        let camera = CameraTarget {
            id: "c1".into(),
            name: "Hall".into(),
            preview_url: "http://cam/snap.jpg".into(),
            preview_mode: PreviewMode::Snapshot,
            ..CameraTarget::default()
        };

        let body = serde_json::to_value(InferenceRequest::for_camera(&settings, &camera)).unwrap();

        assert_eq!(body["host"], "gpu.local");
        assert_eq!(body["timeoutSeconds"], 180);
        assert_eq!(body["previewMode"], "snapshot");
        assert_eq!(body["cameraId"], "c1");
        assert_eq!(body["cameraName"], "Hall");
    }

    #[test]
    fn backend_error_payload_becomes_classified_failure() {
        let payload: AnalyzeResponse =
            serde_json::from_value(json!({"ok": false, "error": "timed out"})).unwrap();
        let result = InferenceResult::from(payload);

        assert!(!result.ok);
        assert!(result.is_timeout());

        let payload: AnalyzeResponse = serde_json::from_value(json!({"ok": false})).unwrap();
        let result = InferenceResult::from(payload);
        assert_eq!(result.error_message(), "Ollama analysis failed.");
        assert_eq!(result.error_kind, Some(InferenceErrorKind::BackendError));
    }

    #[test]
    fn success_payload_keeps_image() {
        let payload: AnalyzeResponse = serde_json::from_value(json!({
            "ok": true,
            "triggered": true,
            "response": "YES, a person is on the floor",
            "image": "aGVsbG8=",
            "image_type": "image/jpeg"
        }))
        .unwrap();
        let result = InferenceResult::from(payload);

        assert!(result.ok && result.triggered);
        assert_eq!(result.image_base64.as_deref(), Some("aGVsbG8="));
        assert_eq!(result.image_type.as_deref(), Some("image/jpeg"));
    }
}
