use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{EngineEvent, EventSink};

const ENABLE_LOGS: bool = true;
use crate::log_info;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum MonitoringMode {
    #[default]
    Disarmed,
    Armed,
    /// Local safety pause after repeated timeouts. The operator's intent to
    /// monitor is kept; only the timer is stopped.
    Paused,
}

impl MonitoringMode {
    pub fn is_armed(&self) -> bool {
        matches!(self, MonitoringMode::Armed)
    }

    /// Label for the arm control.
    pub fn arm_label(&self) -> &'static str {
        match self {
            MonitoringMode::Disarmed => "Save & Arm",
            MonitoringMode::Armed => "Armed",
            MonitoringMode::Paused => "Resume Monitoring",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeEvent {
    /// Operator saved a valid configuration and asked to arm (or resume).
    Arm,
    OperatorDisarm,
    /// The state service reports monitoring as disarmed.
    RemoteDisarmed,
    SessionLost,
    BreakerTripped,
}

/// Next mode for `event`, or `None` when the event does not apply in `mode`.
pub fn transition(mode: MonitoringMode, event: ModeEvent) -> Option<MonitoringMode> {
    use ModeEvent::*;
    use MonitoringMode::*;

    match (mode, event) {
        (Disarmed | Paused, Arm) => Some(Armed),
        (Armed, BreakerTripped) => Some(Paused),
        (Armed | Paused, OperatorDisarm | RemoteDisarmed | SessionLost) => Some(Disarmed),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArmedState {
    pub mode: MonitoringMode,
    pub armed_at: Option<DateTime<Utc>>,
    pub armed_by: Option<String>,
}

impl ArmedState {
    /// Apply `event`; returns the new mode when it changed.
    pub fn apply(&mut self, event: ModeEvent) -> Option<MonitoringMode> {
        let next = transition(self.mode, event)?;
        self.mode = next;
        if next == MonitoringMode::Disarmed {
            self.armed_at = None;
            self.armed_by = None;
        }
        Some(next)
    }
}

/// The armed state shared by the controller and the scheduler. Every mode
/// change is announced on the sink.
#[derive(Clone)]
pub struct ModeCell {
    state: Arc<Mutex<ArmedState>>,
    sink: Arc<dyn EventSink>,
}

impl ModeCell {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ArmedState::default())),
            sink,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ArmedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn mode(&self) -> MonitoringMode {
        self.lock().mode
    }

    pub fn state(&self) -> ArmedState {
        self.lock().clone()
    }

    pub fn apply(&self, event: ModeEvent) -> Option<MonitoringMode> {
        let changed = self.lock().apply(event);
        if let Some(mode) = changed {
            log_info!("monitoring mode -> {mode:?} ({event:?})");
            self.sink.emit(EngineEvent::ModeChanged { mode });
        }
        changed
    }

    /// Record who armed monitoring and when, for display.
    pub fn record_arming(&self, armed_by: Option<String>, armed_at: Option<DateTime<Utc>>) {
        let mut state = self.lock();
        state.armed_by = armed_by;
        state.armed_at = armed_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ModeEvent::*;
    use MonitoringMode::*;

    #[test]
    fn paused_is_only_reachable_from_the_breaker() {
        let events = [Arm, OperatorDisarm, RemoteDisarmed, SessionLost, BreakerTripped];
        for mode in [Disarmed, Armed, Paused] {
            for event in events {
                if transition(mode, event) == Some(Paused) {
                    assert_eq!((mode, event), (Armed, BreakerTripped));
                }
            }
        }
    }

    #[test]
    fn arm_resumes_from_pause_but_not_twice() {
        assert_eq!(transition(Disarmed, Arm), Some(Armed));
        assert_eq!(transition(Paused, Arm), Some(Armed));
        assert_eq!(transition(Armed, Arm), None);
    }

    #[test]
    fn breaker_only_pauses_an_armed_engine() {
        assert_eq!(transition(Disarmed, BreakerTripped), None);
        assert_eq!(transition(Paused, BreakerTripped), None);
    }

    #[test]
    fn disarm_clears_arming_details() {
        let mut state = ArmedState {
            mode: Paused,
            armed_at: Some(Utc::now()),
            armed_by: Some("Bob".into()),
        };

        assert_eq!(state.apply(RemoteDisarmed), Some(Disarmed));
        assert_eq!(state.armed_by, None);
        assert_eq!(state.armed_at, None);
        assert_eq!(state.apply(OperatorDisarm), None);
    }

    #[test]
    fn mode_cell_announces_only_real_changes() {
        let sink = Arc::new(crate::testing::RecordingSink::default());
        let cell = ModeCell::new(sink.clone());

        cell.apply(BreakerTripped);
        cell.apply(Arm);
        cell.apply(Arm);
        cell.apply(BreakerTripped);

        assert_eq!(sink.mode_changes(), vec![Armed, Paused]);
        assert_eq!(cell.mode(), Paused);
    }
}
