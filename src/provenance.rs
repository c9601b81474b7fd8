//! Append-only processing log.
//!
//! Every pipeline decision (default substitution, stage start/end, warning,
//! fallback activation, failure) is recorded as one [`LogEntry`]. The log is
//! an explicit value passed by `&mut` through each stage, so two files
//! processed side by side never share entries. Entries are mirrored to
//! `tracing` for operators; the log itself is what gets persisted.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryLevel {
    #[default]
    Info,
    Warning,
}

/// One `(timestamp, action, details)` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    #[serde(default)]
    pub details: Value,
    #[serde(default)]
    pub level: EntryLevel,
}

/// Ordered, append-only sequence of [`LogEntry`] values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessingLog {
    entries: Vec<LogEntry>,
}

impl ProcessingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an informational entry.
    pub fn record(&mut self, action: impl Into<String>, details: Value) {
        let action = action.into();
        tracing::debug!(action = %action, details = %details, "pipeline");
        self.push(action, details, EntryLevel::Info);
    }

    /// Record a warning. Warnings are never silent: they also go to
    /// `tracing::warn!`.
    pub fn warn(&mut self, action: impl Into<String>, details: Value) {
        let action = action.into();
        tracing::warn!(action = %action, details = %details, "pipeline warning");
        self.push(action, details, EntryLevel::Warning);
    }

    fn push(&mut self, action: String, details: Value, level: EntryLevel) {
        self.entries.push(LogEntry {
            timestamp: Utc::now(),
            action,
            details,
            level,
        });
    }

    /// Append copies of every entry of `other`, preserving order.
    pub fn extend_from(&mut self, other: &ProcessingLog) {
        self.entries.extend(other.entries.iter().cloned());
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(|e| e.level == EntryLevel::Warning)
    }

    /// First entry whose action starts with `prefix`.
    pub fn find(&self, prefix: &str) -> Option<&LogEntry> {
        self.entries.iter().find(|e| e.action.starts_with(prefix))
    }

    /// `true` if any entry's action starts with `prefix`.
    pub fn contains(&self, prefix: &str) -> bool {
        self.find(prefix).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entries_keep_insertion_order() {
        let mut log = ProcessingLog::new();
        log.record("first", Value::Null);
        log.warn("second", json!({"k": 1}));
        log.record("third", Value::Null);
        let actions: Vec<_> = log.entries().iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, ["first", "second", "third"]);
        assert!(log.entries().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn warnings_are_flagged() {
        let mut log = ProcessingLog::new();
        log.record("ok", Value::Null);
        log.warn("bad", Value::Null);
        assert_eq!(log.warnings().count(), 1);
        assert_eq!(log.find("bad").unwrap().level, EntryLevel::Warning);
    }

    #[test]
    fn serializes_as_plain_array() {
        let mut log = ProcessingLog::new();
        log.record("Configuration loaded successfully", json!({"version": "1.0"}));
        let v = serde_json::to_value(&log).unwrap();
        assert!(v.is_array());
        let back: ProcessingLog = serde_json::from_value(v).unwrap();
        assert_eq!(back, log);
    }
}
