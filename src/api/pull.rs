use anyhow::{bail, Result};
use serde::Deserialize;

use crate::models::{lenient_opt_u64, lenient_u16};

use super::{ApiClient, ApiRequest};

const PULL_STATUS_PATH: &str = "/api/ollama-pull-status";

/// Progress of a model download running on the appliance.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PullStatus {
    pub ok: bool,
    pub in_progress: bool,
    pub status: String,
    #[serde(deserialize_with = "lenient_opt_u64")]
    pub completed: Option<u64>,
    #[serde(deserialize_with = "lenient_opt_u64")]
    pub total: Option<u64>,
    pub model: String,
    pub host: String,
    #[serde(deserialize_with = "lenient_u16")]
    pub port: u16,
    pub error: Option<String>,
}

impl PullStatus {
    pub fn percent(&self) -> Option<u8> {
        match (self.completed, self.total) {
            (Some(completed), Some(total)) if completed > 0 && total > 0 => {
                let percent = (completed as f64 / total as f64 * 100.0).round();
                Some(percent.min(100.0) as u8)
            }
            _ => None,
        }
    }

    /// Operator-facing progress line, e.g. `pulling manifest (42% · 120MB / 285MB)`.
    pub fn detail(&self) -> String {
        if !self.in_progress {
            return self.status.clone();
        }

        let target = if !self.model.is_empty() && !self.host.is_empty() && self.port > 0 {
            format!("{} on {}:{}", self.model, self.host, self.port)
        } else if !self.model.is_empty() {
            self.model.clone()
        } else {
            "model".to_string()
        };
        let base = if self.status.is_empty() {
            format!("Pulling {target}…")
        } else {
            self.status.clone()
        };

        match (self.percent(), self.completed, self.total) {
            (Some(percent), Some(completed), Some(total)) => format!(
                "{base} ({percent}% · {}MB / {}MB)",
                megabytes(completed),
                megabytes(total)
            ),
            _ => base,
        }
    }
}

fn megabytes(bytes: u64) -> u64 {
    (bytes as f64 / 1024.0 / 1024.0).round() as u64
}

impl ApiClient {
    pub async fn fetch_pull_status(&self) -> Result<PullStatus> {
        let response = self
            .guard
            .guarded_fetch(ApiRequest::get(PULL_STATUS_PATH))
            .await?;
        let status: PullStatus = response.json()?;
        if !status.ok {
            bail!("pull status answered HTTP {}", response.status);
        }
        Ok(status)
    }
}
