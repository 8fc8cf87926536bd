//! The raw request/response port every service client sits on.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            headers: Vec::new(),
        }
    }

    /// Set a header, replacing any earlier value with the same name.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json_body(status: u16, body: Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    /// The body as a JSON object, if it is one.
    pub fn json_object(&self) -> Option<serde_json::Map<String, Value>> {
        match serde_json::from_str::<Value>(&self.body) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    /// A string field of the JSON body, trimmed; `None` when missing or blank.
    pub fn field_str(&self, key: &str) -> Option<String> {
        self.json_object()?
            .get(key)?
            .as_str()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// `Transport` over HTTP against the appliance's API server.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// No overall request timeout is set: analysis calls last as long as the
    /// backend's own advisory timeout allows.
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.http.get(&url).header("Cache-Control", "no-store"),
            Method::Post => self.http.post(&url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| TransportError(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError(err.to_string()))?;

        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_replacement_is_case_insensitive() {
        let request = ApiRequest::get("/api/state")
            .with_header("x-session-token", "old")
            .with_header("X-Session-Token", "new");

        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.header("X-SESSION-TOKEN"), Some("new"));
    }

    #[test]
    fn field_str_ignores_blank_and_non_object_bodies() {
        let response = ApiResponse::json_body(403, json!({"active_user": "  ", "error": "nope"}));
        assert_eq!(response.field_str("active_user"), None);
        assert_eq!(response.field_str("error").as_deref(), Some("nope"));

        let html = ApiResponse::new(403, "<html>Forbidden</html>");
        assert!(html.json_object().is_none());
        assert_eq!(html.field_str("error"), None);
    }

    #[test]
    fn url_joins_without_double_slashes() {
        let transport = HttpTransport::new("http://appliance.local:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(transport.url("/api/state"), "http://appliance.local:8000/api/state");
    }
}
