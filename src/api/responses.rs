use anyhow::{bail, Result};
use serde::Deserialize;

use crate::models::ResponseLogEntry;

use super::{ApiClient, ApiRequest};

const RESPONSES_PATH: &str = "/api/ollama-responses";

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ResponsesEnvelope {
    ok: bool,
    responses: Vec<ResponseLogEntry>,
}

impl ApiClient {
    /// Recent inference responses kept by the appliance, oldest first.
    pub async fn fetch_responses(&self) -> Result<Vec<ResponseLogEntry>> {
        let response = self
            .guard
            .guarded_fetch(ApiRequest::get(RESPONSES_PATH))
            .await?;
        let envelope: ResponsesEnvelope = response.json()?;
        if !envelope.ok {
            bail!("response log answered HTTP {}", response.status);
        }
        Ok(envelope.responses)
    }
}
