//! Test and helper reporters for desk_core

use std::sync::{Arc, Mutex};

use crate::notify::ProgressReporter;

/// Keeps every status line; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// How many times exactly `line` was reported.
    pub fn count(&self, line: &str) -> usize {
        self.lines().iter().filter(|l| l.as_str() == line).count()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, status: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(status.to_string());
        }
    }
}

/// Discards everything.
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn report(&self, _status: &str) {}
}
