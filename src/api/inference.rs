use crate::error::SessionError;
use crate::models::{AnalyzeResponse, InferenceRequest, InferenceResult};

use super::{snippet, ApiClient, ApiRequest};

const ANALYZE_PATH: &str = "/api/ollama-analyze";

impl ApiClient {
    /// Run one analysis.
    ///
    /// Every failure short of a closed session comes back as a failed
    /// [`InferenceResult`], so callers treat a dropped connection and an
    /// `ok: false` payload alike.
    pub async fn analyze(&self, request: &InferenceRequest) -> Result<InferenceResult, SessionError> {
        let body = match serde_json::to_value(request) {
            Ok(body) => body,
            Err(err) => {
                return Ok(InferenceResult::failure(
                    format!("Invalid analysis request: {err}"),
                    false,
                ))
            }
        };

        let response = match self.guard.guarded_fetch(ApiRequest::post(ANALYZE_PATH, body)).await {
            Ok(response) => response,
            Err(SessionError::Network(message)) => {
                return Ok(InferenceResult::failure(message, true));
            }
            Err(closed) => return Err(closed),
        };

        match response.json::<AnalyzeResponse>() {
            Ok(payload) if response.is_success() || !payload.ok => Ok(payload.into()),
            _ => Ok(InferenceResult::failure(
                format!("HTTP {}: {}", response.status, snippet(&response.body, 200)),
                false,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::error::InferenceErrorKind;
    use crate::models::{CameraTarget, InferenceSettings};
    use crate::session::{FixedAnswer, SessionGuard};
    use crate::testing::{MockTransport, RecordingSink};

    async fn client(transport: &Arc<MockTransport>) -> ApiClient {
        transport.reply("/api/session/start", 200, json!({"ok": true}));
        let guard = SessionGuard::new(transport.clone(), "tok", "Bob", Arc::new(RecordingSink::default()));
        guard.begin(&FixedAnswer(false)).await;
        ApiClient::new(Arc::new(guard))
    }

    fn request() -> InferenceRequest {
        InferenceRequest::for_camera(&InferenceSettings::default(), &CameraTarget::new("Hall"))
    }

    #[tokio::test]
    async fn unreachable_backend_becomes_network_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.fail(ANALYZE_PATH, "connection reset by peer");
        let client = client(&transport).await;

        let result = client.analyze(&request()).await.unwrap();

        assert!(!result.ok);
        assert_eq!(result.error_kind, Some(InferenceErrorKind::NetworkError));
    }

    #[tokio::test]
    async fn non_json_error_page_becomes_backend_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.reply_raw(ANALYZE_PATH, 502, "<html>Bad Gateway</html>");
        let client = client(&transport).await;

        let result = client.analyze(&request()).await.unwrap();

        assert_eq!(result.error.as_deref(), Some("HTTP 502: <html>Bad Gateway</html>"));
        assert_eq!(result.error_kind, Some(InferenceErrorKind::BackendError));
    }

    #[tokio::test]
    async fn error_payload_keeps_backend_wording() {
        let transport = Arc::new(MockTransport::new());
        transport.reply(ANALYZE_PATH, 502, json!({"ok": false, "error": "timed out"}));
        let client = client(&transport).await;

        let result = client.analyze(&request()).await.unwrap();

        assert!(result.is_timeout());
    }

    #[tokio::test]
    async fn kicked_session_is_an_error_not_a_result() {
        let transport = Arc::new(MockTransport::new());
        transport.reply(ANALYZE_PATH, 403, json!({"kicked_by": "Carol"}));
        let client = client(&transport).await;

        let err = client.analyze(&request()).await.unwrap_err();

        assert!(err.is_closed());
    }
}
