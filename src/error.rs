//! Classified errors the engine branches on.
//!
//! Orchestration operations return `anyhow::Result`; these enums exist for the
//! places where a caller has to tell one failure apart from another.

use serde::{Deserialize, Serialize};

/// Failure of a call routed through the session guard.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The session is blocked. Fatal until the engine is rebuilt.
    #[error("Session closed: {0}")]
    Closed(String),

    /// The request never produced an HTTP response.
    #[error("Network error: {0}")]
    Network(String),
}

impl SessionError {
    pub fn is_closed(&self) -> bool {
        matches!(self, SessionError::Closed(_))
    }
}

/// Failure of the raw transport, below the session guard.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Kind of a failed inference, decoupled from the backend's wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InferenceErrorKind {
    /// The backend gave up waiting on the model. Counts toward the breaker.
    Timeout,
    /// The backend answered with an error payload.
    BackendError,
    /// The request never reached the backend.
    NetworkError,
}

/// Classify an inference failure message.
///
/// `unreachable` is set when the call failed below HTTP (no response at all).
/// Timeout detection wins over reachability: a proxy that drops a slow
/// request still means the model is too slow.
pub fn classify_inference_error(message: &str, unreachable: bool) -> InferenceErrorKind {
    let lowered = message.to_lowercase();
    if lowered.contains("timed out") || lowered.contains("timeout") {
        InferenceErrorKind::Timeout
    } else if unreachable {
        InferenceErrorKind::NetworkError
    } else {
        InferenceErrorKind::BackendError
    }
}

/// Reasons the armed-state controller refuses to arm.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArmError {
    #[error("Fix errors before arming the system.")]
    Invalid,

    #[error("monitoring is already armed")]
    AlreadyArmed,

    #[error("session closed")]
    SessionClosed,
}

/// Camera registry mutations that cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown camera '{0}'")]
    UnknownCamera(String),

    #[error("at least one camera must remain configured")]
    LastCamera,

    #[error("a camera with id '{0}' already exists")]
    DuplicateCamera(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_wording_is_classified_as_timeout() {
        assert_eq!(
            classify_inference_error("timed out", false),
            InferenceErrorKind::Timeout
        );
        assert_eq!(
            classify_inference_error("<urlopen error _ssl.c:980: The handshake operation Timed Out>", false),
            InferenceErrorKind::Timeout
        );
        assert_eq!(
            classify_inference_error("Read timeout after 180s", true),
            InferenceErrorKind::Timeout
        );
    }

    #[test]
    fn other_failures_split_on_reachability() {
        assert_eq!(
            classify_inference_error("HTTP 500: Internal Server Error", false),
            InferenceErrorKind::BackendError
        );
        assert_eq!(
            classify_inference_error("connection refused", true),
            InferenceErrorKind::NetworkError
        );
    }
}
