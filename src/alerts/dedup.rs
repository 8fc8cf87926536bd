//! Suppression of repeated error entries.
//!
//! An error surfaces when its message differs from the last one surfaced
//! under the same key, or when more than the window has elapsed since then.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

pub const DEDUP_WINDOW: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Analysis,
    EmailDelivery,
    ResponseLog,
}

/// Dedup key. Analysis errors are tracked per camera so that one camera's
/// repeating failure never hides another camera's.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub class: ErrorClass,
    pub camera_id: Option<String>,
}

impl DedupKey {
    pub fn analysis(camera_id: &str) -> Self {
        Self {
            class: ErrorClass::Analysis,
            camera_id: Some(camera_id.to_string()),
        }
    }

    pub fn email() -> Self {
        Self {
            class: ErrorClass::EmailDelivery,
            camera_id: None,
        }
    }

    pub fn response_log() -> Self {
        Self {
            class: ErrorClass::ResponseLog,
            camera_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDedupWindow {
    pub last_message: String,
    pub last_at: Instant,
}

#[derive(Debug)]
pub struct DedupTable {
    window: Duration,
    entries: HashMap<DedupKey, ErrorDedupWindow>,
}

impl Default for DedupTable {
    fn default() -> Self {
        Self::new(DEDUP_WINDOW)
    }
}

impl DedupTable {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    /// Whether `message` should surface now; records it when it does.
    pub fn should_surface(&mut self, key: DedupKey, message: &str, now: Instant) -> bool {
        if let Some(last) = self.entries.get(&key) {
            let repeated = last.last_message == message;
            if repeated && now.saturating_duration_since(last.last_at) <= self.window {
                return false;
            }
        }

        self.entries.insert(
            key,
            ErrorDedupWindow {
                last_message: message.to_string(),
                last_at: now,
            },
        );
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_message_is_suppressed_inside_window() {
        let mut table = DedupTable::default();
        let start = Instant::now();

        assert!(table.should_surface(DedupKey::email(), "SMTP auth failed", start));
        assert!(!table.should_surface(DedupKey::email(), "SMTP auth failed", start + Duration::from_secs(5)));
        assert!(!table.should_surface(DedupKey::email(), "SMTP auth failed", start + Duration::from_secs(30)));
        assert!(table.should_surface(DedupKey::email(), "SMTP auth failed", start + Duration::from_secs(31)));
    }

    #[test]
    fn different_message_surfaces_immediately() {
        let mut table = DedupTable::default();
        let start = Instant::now();

        assert!(table.should_surface(DedupKey::email(), "SMTP auth failed", start));
        assert!(table.should_surface(DedupKey::email(), "Missing sender email.", start + Duration::from_secs(1)));
        assert!(table.should_surface(DedupKey::email(), "SMTP auth failed", start + Duration::from_secs(2)));
    }

    #[test]
    fn cameras_do_not_mask_each_other() {
        let mut table = DedupTable::default();
        let start = Instant::now();

        assert!(table.should_surface(DedupKey::analysis("a"), "timed out", start));
        assert!(table.should_surface(DedupKey::analysis("b"), "timed out", start));
        assert!(!table.should_surface(DedupKey::analysis("a"), "timed out", start + Duration::from_secs(10)));
        assert!(!table.should_surface(DedupKey::analysis("b"), "timed out", start + Duration::from_secs(10)));
    }
}
