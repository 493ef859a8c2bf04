//! Operator-facing activity journal
//!
//! Unlike the operation history this records everything the operator should
//! see, failures included. Entries are plain text with a local timestamp.

use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Local>,
    pub level: ActivityLevel,
    pub message: String,
}

impl fmt::Display for ActivityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.level {
            ActivityLevel::Info => "",
            ActivityLevel::Warning => "warning: ",
            ActivityLevel::Error => "error: ",
        };
        write!(
            f,
            "[{}] {}{}",
            self.timestamp.format("%H:%M:%S"),
            marker,
            self.message
        )
    }
}

#[derive(Clone, Debug, Default)]
pub struct ActivityLog {
    entries: Vec<ActivityEntry>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Journal opened with the session banner
    pub fn with_welcome() -> Self {
        let mut log = Self::new();
        log.info(format!("roiseg {} session started", env!("CARGO_PKG_VERSION")));
        log.info("1. Load a CT series");
        log.info("2. Draw ROI 1 on the first slice and ROI 2 on the last slice");
        log.info("3. Choose a model and run segmentation");
        log.info("4. Tune refinement parameters or apply a preset");
        log
    }

    fn push(&mut self, level: ActivityLevel, message: String) {
        self.entries.push(ActivityEntry {
            timestamp: Local::now(),
            level,
            message,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(ActivityLevel::Info, message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(ActivityLevel::Warning, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(ActivityLevel::Error, message.into());
    }

    pub fn entries(&self) -> &[ActivityEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&ActivityEntry> {
        self.entries.last()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.level == ActivityLevel::Error)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welcome_banner() {
        let log = ActivityLog::with_welcome();
        assert_eq!(log.len(), 5);
        assert!(log.entries()[0].message.contains("session started"));
        assert_eq!(log.errors().count(), 0);
    }

    #[test]
    fn test_levels_render_with_marker() {
        let mut log = ActivityLog::new();
        log.info("loaded");
        log.error("segmentation failed");
        let line = log.last().unwrap().to_string();
        assert!(line.starts_with('['));
        assert!(line.ends_with("error: segmentation failed"));
        assert_eq!(log.errors().count(), 1);
    }
}
