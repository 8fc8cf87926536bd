pub mod breaker;
pub mod controller;
pub mod pull;
pub mod scheduler;
pub mod state;

pub use breaker::{BreakerVerdict, CircuitBreaker, CycleTally, TIMEOUT_THRESHOLD};
pub use controller::{ArmedStateController, EngineSnapshot};
pub use pull::{PullStatusPoller, PULL_POLL_INTERVAL};
pub use scheduler::{AnalysisScheduler, CycleReport, InferenceTestReport, SkipReason};
pub use state::{transition, ArmedState, ModeCell, ModeEvent, MonitoringMode};
