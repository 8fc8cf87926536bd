//! Outbound events for whatever renders the control room.
//!
//! The engine never touches presentation; it emits [`EngineEvent`]s into an
//! [`EventSink`] and the embedding decides what to draw.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::models::ResponseLogEntry;
use crate::monitor::MonitoringMode;

const ENABLE_LOGS: bool = true;
use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StatusLevel {
    Info,
    Ok,
    Warn,
    Error,
}

/// One line of the operator-facing status log.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    pub title: String,
    pub level: StatusLevel,
    pub detail: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "type", content = "payload")]
pub enum EngineEvent {
    Status(StatusEntry),
    ModeChanged {
        mode: MonitoringMode,
    },
    AlertCount {
        count: u32,
    },
    InferenceActive,
    ResponsesRefreshed {
        entries: Vec<ResponseLogEntry>,
    },
    /// The session is over; the UI must cover everything until reload.
    SessionBlocked {
        message: String,
    },
    PullProgress {
        in_progress: bool,
        status: String,
        percent: Option<u8>,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Forwards events into a tokio channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: EngineEvent) {
        // A closed receiver means nobody is rendering any more.
        let _ = self.tx.send(event);
    }
}

/// Writes events to the log and nowhere else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: EngineEvent) {
        match event {
            EngineEvent::Status(_) => {}
            EngineEvent::SessionBlocked { message } => log_warn!("session blocked: {message}"),
            other => log_info!("event: {other:?}"),
        }
    }
}

/// Emit a status entry and mirror it to the log.
pub fn emit_status(
    sink: &dyn EventSink,
    title: &str,
    level: StatusLevel,
    detail: impl Into<String>,
) {
    let detail = detail.into();
    match level {
        StatusLevel::Error => log_error!("[{title}] {detail}"),
        StatusLevel::Warn => log_warn!("[{title}] {detail}"),
        StatusLevel::Info | StatusLevel::Ok => log_info!("[{title}] {detail}"),
    }

    sink.emit(EngineEvent::Status(StatusEntry {
        title: title.to_string(),
        level,
        detail,
        at: Utc::now(),
    }));
}
