use anyhow::{bail, Result};
use serde_json::json;

use crate::models::RemoteState;

use super::{ApiClient, ApiRequest};

const STATE_PATH: &str = "/api/state";

impl ApiClient {
    pub async fn fetch_state(&self) -> Result<RemoteState> {
        let response = self.guard.guarded_fetch(ApiRequest::get(STATE_PATH)).await?;
        if !response.is_success() {
            bail!("state service answered HTTP {}", response.status);
        }
        Ok(response.json::<RemoteState>()?)
    }

    /// Publish the armed flag. `armed_by` is ignored by the server when disarming.
    pub async fn publish_state(&self, armed: bool, armed_by: &str) -> Result<RemoteState> {
        let body = json!({ "armed": armed, "armed_by": armed_by });
        let response = self
            .guard
            .guarded_fetch(ApiRequest::post(STATE_PATH, body))
            .await?;
        if !response.is_success() {
            bail!("state service answered HTTP {}", response.status);
        }
        Ok(response.json::<RemoteState>()?)
    }
}
