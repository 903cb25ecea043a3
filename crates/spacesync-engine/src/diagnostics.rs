//! Bounded capture of recent engine failures for the external surface.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// How many failures are retained; older entries fall off.
pub const RECENT_ERROR_CAPACITY: usize = 2;

/// One captured failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    /// Capture time, nanoseconds since the epoch.
    pub at: i64,
    /// Component that reported the failure (e.g. "pipeline", "watcher").
    pub component: &'static str,
    pub message: String,
}

/// Fixed-capacity ring of the most recent failures.
#[derive(Debug, Default)]
pub struct ErrorLog {
    entries: Mutex<VecDeque<ErrorEntry>>,
}

impl ErrorLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, component: &'static str, message: impl Into<String>) {
        let at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as i64);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() == RECENT_ERROR_CAPACITY {
            entries.pop_front();
        }
        entries.push_back(ErrorEntry {
            at,
            component,
            message: message.into(),
        });
    }

    /// The retained failures, newest first.
    #[must_use]
    pub fn recent(&self) -> Vec<ErrorEntry> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().rev().cloned().collect()
    }
}
