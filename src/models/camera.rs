//! Camera targets as the registry stores them and the config payload carries them.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u32 = 20;
pub const MIN_SNAPSHOT_INTERVAL_SECS: u32 = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreviewMode {
    #[default]
    Mjpeg,
    Snapshot,
    Rtsp,
}

impl PreviewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreviewMode::Mjpeg => "mjpeg",
            PreviewMode::Snapshot => "snapshot",
            PreviewMode::Rtsp => "rtsp",
        }
    }
}

/// Unknown or missing preview modes fall back to MJPEG, matching how older
/// exported configs are read.
fn lenient_preview_mode<'de, D>(deserializer: D) -> Result<PreviewMode, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(match raw.as_deref().map(str::trim) {
        Some("snapshot") => PreviewMode::Snapshot,
        Some("rtsp") => PreviewMode::Rtsp,
        _ => PreviewMode::Mjpeg,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CameraTarget {
    pub id: String,
    pub name: String,
    pub model: String,
    pub ip: String,
    pub stream_url: String,
    pub rtsp_user: String,
    pub rtsp_pass: String,
    pub stream_profile: String,
    pub preview_url: String,
    #[serde(deserialize_with = "lenient_preview_mode")]
    pub preview_mode: PreviewMode,
    #[serde(
        rename = "snapshotInterval",
        deserialize_with = "super::lenient_u32"
    )]
    pub snapshot_interval_seconds: u32,
    pub motion_snapshotting: bool,
}

impl Default for CameraTarget {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            model: String::new(),
            ip: String::new(),
            stream_url: String::new(),
            rtsp_user: String::new(),
            rtsp_pass: String::new(),
            stream_profile: "main".into(),
            preview_url: String::new(),
            preview_mode: PreviewMode::Mjpeg,
            snapshot_interval_seconds: DEFAULT_SNAPSHOT_INTERVAL_SECS,
            motion_snapshotting: true,
        }
    }
}

impl CameraTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_camera_id(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Fill in an id and bring the snapshot interval into range.
    pub fn normalized(mut self) -> Self {
        if self.id.trim().is_empty() {
            self.id = new_camera_id();
        }
        if self.snapshot_interval_seconds == 0 {
            self.snapshot_interval_seconds = DEFAULT_SNAPSHOT_INTERVAL_SECS;
        }
        self.snapshot_interval_seconds = self
            .snapshot_interval_seconds
            .max(MIN_SNAPSHOT_INTERVAL_SECS);
        if self.stream_profile.trim().is_empty() {
            self.stream_profile = "main".into();
        }
        self
    }

    /// Human-readable label for status text.
    pub fn label(&self) -> &str {
        if !self.name.trim().is_empty() {
            &self.name
        } else if !self.model.trim().is_empty() {
            &self.model
        } else {
            "Camera"
        }
    }
}

fn new_camera_id() -> String {
    Uuid::new_v4().to_string()
}
