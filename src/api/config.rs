use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::models::MonitorConfig;

use super::{ApiClient, ApiRequest};

const CONFIG_PATH: &str = "/api/config";

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigEnvelope {
    ok: bool,
    config: Value,
    error: Option<String>,
}

impl ApiClient {
    /// The stored configuration; `None` when the server holds nothing yet.
    pub async fn fetch_config(&self) -> Result<Option<MonitorConfig>> {
        let response = self.guard.guarded_fetch(ApiRequest::get(CONFIG_PATH)).await?;
        let envelope: ConfigEnvelope = response
            .json()
            .with_context(|| format!("config service answered HTTP {}", response.status))?;
        if !response.is_success() || !envelope.ok {
            bail!(envelope
                .error
                .unwrap_or_else(|| format!("config service answered HTTP {}", response.status)));
        }

        match envelope.config {
            Value::Object(map) if map.is_empty() => Ok(None),
            Value::Null => Ok(None),
            config => Ok(Some(
                serde_json::from_value(config).context("stored configuration is malformed")?,
            )),
        }
    }

    pub async fn store_config(&self, config: &MonitorConfig) -> Result<()> {
        let body = serde_json::to_value(config)?;
        let response = self
            .guard
            .guarded_fetch(ApiRequest::post(CONFIG_PATH, body))
            .await?;
        let saved = response
            .json_object()
            .and_then(|payload| payload.get("ok").and_then(Value::as_bool))
            .unwrap_or(false);
        if !response.is_success() || !saved {
            bail!(response
                .field_str("error")
                .unwrap_or_else(|| format!("config service answered HTTP {}", response.status)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::session::{FixedAnswer, SessionGuard};
    use crate::testing::{MockTransport, RecordingSink};

    async fn client(transport: &Arc<MockTransport>) -> ApiClient {
        transport.reply("/api/session/start", 200, json!({"ok": true}));
        let guard = SessionGuard::new(transport.clone(), "tok", "Bob", Arc::new(RecordingSink::default()));
        guard.begin(&FixedAnswer(false)).await;
        ApiClient::new(Arc::new(guard))
    }

    #[tokio::test]
    async fn store_requires_an_ok_body() {
        let transport = Arc::new(MockTransport::new());
        transport.reply(CONFIG_PATH, 200, json!({"ok": false, "error": "Disk full."}));
        let api = client(&transport).await;

        let err = api.store_config(&MonitorConfig::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "Disk full.");

        transport.clear(CONFIG_PATH);
        transport.reply_raw(CONFIG_PATH, 200, "saved");
        assert!(api.store_config(&MonitorConfig::default()).await.is_err());

        transport.clear(CONFIG_PATH);
        transport.reply(CONFIG_PATH, 200, json!({"ok": true}));
        api.store_config(&MonitorConfig::default()).await.unwrap();
    }

    #[tokio::test]
    async fn empty_stored_config_reads_as_none() {
        let transport = Arc::new(MockTransport::new());
        transport.reply(CONFIG_PATH, 200, json!({"ok": true, "config": {}}));
        let api = client(&transport).await;

        assert!(api.fetch_config().await.unwrap().is_none());
    }
}
