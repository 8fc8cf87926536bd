pub mod alerts;
pub mod api;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod monitor;
pub mod registry;
pub mod session;
pub mod settings;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};

pub use engine::MonitorEngine;
pub use error::{ArmError, InferenceErrorKind, RegistryError, SessionError};
pub use events::{ChannelSink, EngineEvent, EventSink, LogSink, StatusEntry, StatusLevel};
pub use monitor::{CycleReport, EngineSnapshot, InferenceTestReport, MonitoringMode};
pub use registry::CameraRegistry;
pub use settings::{EngineSettings, IdentityStore};

use api::HttpTransport;
use models::SessionPhase;
use session::FixedAnswer;

/// Install the env_logger backend. `RUST_LOG` still wins over `debug`.
pub fn init_logging(debug: bool) {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    // A second call (tests, embedders) keeps the first logger.
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

/// Headless control room: claim the session, follow the engine's events in
/// the log, and leave cleanly on Ctrl-C.
pub fn run() -> Result<()> {
    let settings = EngineSettings::from_env();
    init_logging(settings.debug);
    log::info!("fallwatch starting up, server={}", settings.server_url);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    runtime.block_on(run_headless(settings))
}

async fn run_headless(settings: EngineSettings) -> Result<()> {
    let identity = IdentityStore::new(settings.identity_path.clone())?;
    let token = identity.ensure_token()?;
    let operator = settings
        .operator_name
        .clone()
        .or_else(|| identity.operator_name())
        .unwrap_or_default();
    if !operator.is_empty() {
        identity.remember_name(&operator)?;
    }

    let transport = Arc::new(HttpTransport::new(&settings.server_url, settings.connect_timeout)?);
    let (sink, mut events) = ChannelSink::new();
    let engine = MonitorEngine::new(transport, token, operator, Arc::new(sink));

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::Status(_) => {}
                EngineEvent::SessionBlocked { message } => log::warn!("session blocked: {message}"),
                other => log::info!("{other:?}"),
            }
        }
    });

    let phase = engine
        .start_session(&FixedAnswer(settings.auto_takeover))
        .await;
    if let SessionPhase::Blocked(message) = phase {
        log::error!("{message}");
        engine.close().await;
        printer.abort();
        return Ok(());
    }

    engine.pull_status().start().await;
    if settings.arm_on_start {
        let config = engine.config();
        let valid = !config.cameras.is_empty() && config.ollama.is_complete();
        if let Err(err) = engine.arm(valid, true).await {
            log::warn!("not armed: {err}");
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    log::info!("shutting down");
    engine.close().await;
    printer.abort();
    Ok(())
}
