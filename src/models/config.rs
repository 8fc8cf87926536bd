//! The configuration payload exchanged with the config service and written
//! to exported files.

use std::{
    fs,
    path::Path,
    sync::{Arc, RwLock},
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{lenient_opt_u64, lenient_u16, CameraTarget};

pub const DEFAULT_TIMEOUT_SECS: u64 = 180;
pub const MIN_INTERVAL_SECS: u64 = 10;
pub const MAX_INTERVAL_SECS: u64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct InferenceSettings {
    pub host: String,
    #[serde(deserialize_with = "lenient_u16")]
    pub port: u16,
    pub model: String,
    pub prompt: String,
    pub trigger: String,
    #[serde(deserialize_with = "lenient_opt_u64")]
    pub timeout_seconds: Option<u64>,
    #[serde(deserialize_with = "lenient_opt_u64")]
    pub interval_seconds: Option<u64>,
}

impl InferenceSettings {
    /// Host, port, model and prompt are all present.
    pub fn is_complete(&self) -> bool {
        !self.host.trim().is_empty()
            && self.port > 0
            && !self.model.trim().is_empty()
            && !self.prompt.trim().is_empty()
    }

    /// Advisory timeout handed to the backend.
    pub fn effective_timeout_secs(&self) -> u64 {
        self.timeout_seconds
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    /// Cycle interval: explicit interval, else the timeout, clamped to 10..=600s.
    pub fn cycle_interval(&self) -> Duration {
        let secs = self
            .interval_seconds
            .filter(|secs| *secs > 0)
            .unwrap_or_else(|| self.effective_timeout_secs());
        Duration::from_secs(secs.clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertSettings {
    pub email_enabled: bool,
    pub sender_email: String,
    pub gmail_user: String,
    pub gmail_app_password: String,
    pub gmail_sender_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Responder {
    pub name: String,
    pub role: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UiPreferences {
    pub auto_minimal_mode: bool,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            auto_minimal_mode: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    pub cameras: Vec<CameraTarget>,
    pub active_camera_id: Option<String>,
    pub monitor_all_cameras: bool,
    /// Legacy single-camera field, still written for older readers.
    pub camera: Option<CameraTarget>,
    pub ollama: InferenceSettings,
    pub alerts: AlertSettings,
    pub responders: Vec<Responder>,
    pub ui: UiPreferences,
    pub saved_at: Option<DateTime<Utc>>,
}

/// Camera selection resolved out of a config payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSelection {
    pub cameras: Vec<CameraTarget>,
    pub active_camera_id: Option<String>,
    pub monitor_all: bool,
}

impl MonitorConfig {
    /// Resolve the camera list, preferring `cameras` over the legacy `camera`.
    ///
    /// The active id falls back to the first camera when it names nothing.
    pub fn camera_selection(&self) -> CameraSelection {
        if !self.cameras.is_empty() {
            let cameras: Vec<CameraTarget> = self
                .cameras
                .iter()
                .cloned()
                .map(CameraTarget::normalized)
                .collect();
            let active = self
                .active_camera_id
                .as_ref()
                .filter(|id| cameras.iter().any(|camera| &camera.id == *id))
                .cloned()
                .or_else(|| cameras.first().map(|camera| camera.id.clone()));
            return CameraSelection {
                cameras,
                active_camera_id: active,
                monitor_all: self.monitor_all_cameras,
            };
        }

        match &self.camera {
            Some(camera) => {
                let camera = camera.clone().normalized();
                CameraSelection {
                    active_camera_id: Some(camera.id.clone()),
                    cameras: vec![camera],
                    monitor_all: false,
                }
            }
            None => CameraSelection {
                cameras: Vec::new(),
                active_camera_id: None,
                monitor_all: false,
            },
        }
    }

    /// Trimmed, well-formed responder email addresses.
    pub fn recipients(&self) -> Vec<String> {
        self.responders
            .iter()
            .map(|responder| responder.email.trim())
            .filter(|email| is_valid_email(email))
            .map(str::to_string)
            .collect()
    }

    /// Carry a registry selection, keeping the legacy `camera` field in step
    /// with the active camera.
    pub fn with_selection(mut self, selection: CameraSelection) -> Self {
        self.camera = selection
            .active_camera_id
            .as_ref()
            .and_then(|id| selection.cameras.iter().find(|camera| &camera.id == id))
            .cloned();
        self.cameras = selection.cameras;
        self.active_camera_id = selection.active_camera_id;
        self.monitor_all_cameras = selection.monitor_all;
        self
    }

    pub fn stamped(mut self) -> Self {
        self.saved_at = Some(Utc::now());
        self
    }

    pub fn export_to(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write configuration to {}", path.display()))
    }

    pub fn import_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse configuration file {}", path.display()))
    }

    /// Suggested export file name, e.g. `fall-detector-config-2026-10-16T09-30-00-000Z.json`.
    pub fn export_file_name(now: DateTime<Utc>) -> String {
        let stamp = now
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string()
            .replace([':', '.'], "-");
        format!("fall-detector-config-{stamp}.json")
    }
}

/// `local@domain.tld` with no whitespace.
pub fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// Settings the running engine reads at the start of every cycle.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig(Arc<RwLock<MonitorConfig>>);

impl SharedConfig {
    pub fn new(config: MonitorConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    pub fn get(&self) -> MonitorConfig {
        self.0
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn replace(&self, config: MonitorConfig) {
        *self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
    }

    pub fn inference(&self) -> InferenceSettings {
        self.get().ollama
    }
}
