pub mod camera;
pub mod config;
pub mod inference;
pub mod session;

pub use camera::{CameraTarget, PreviewMode};
pub use config::{
    is_valid_email, AlertSettings, CameraSelection, InferenceSettings, MonitorConfig, Responder,
    SharedConfig, UiPreferences,
};
pub use inference::{AnalyzeResponse, InferenceRequest, InferenceResult, ResponseLogEntry};
pub use session::{RemoteState, Session, SessionPhase};

use serde::{Deserialize, Deserializer};
use serde_json::Value;

// Form-built payloads carry numbers as numbers, strings, or nothing at all.
fn loose_number(value: Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|number| number.is_finite() && *number >= 0.0)
}

pub(crate) fn lenient_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(loose_number(value).map(|number| number.round() as u64))
}

pub(crate) fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(loose_number(value)
        .map(|number| number.round().min(u32::MAX as f64) as u32)
        .unwrap_or(0))
}

pub(crate) fn lenient_u16<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(loose_number(value)
        .filter(|number| *number <= u16::MAX as f64)
        .map(|number| number as u16)
        .unwrap_or(0))
}
