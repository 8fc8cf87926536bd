//! Operator session and remote armed-state models.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The client's cached belief about its operator session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub operator_name: String,
    pub active: bool,
}

/// Where session establishment stands. Guarded calls wait while `Pending`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "phase", content = "message")]
pub enum SessionPhase {
    Pending,
    Active,
    Blocked(String),
}

impl SessionPhase {
    pub fn is_settled(&self) -> bool {
        !matches!(self, SessionPhase::Pending)
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, SessionPhase::Blocked(_))
    }
}

/// Armed flag as the state service reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RemoteState {
    pub armed: bool,
    pub armed_by: Option<String>,
    /// Seconds since the epoch; 0 when disarmed.
    pub armed_at: Option<f64>,
}

impl RemoteState {
    pub fn armed_at_utc(&self) -> Option<DateTime<Utc>> {
        let secs = self.armed_at.filter(|secs| *secs > 0.0)?;
        let millis = (secs * 1000.0) as i64;
        Utc.timestamp_millis_opt(millis).single()
    }

    pub fn armed_by(&self) -> Option<&str> {
        self.armed_by
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}
