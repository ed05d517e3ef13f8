use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// The instance a line was produced by.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceInstance {
    pub id: String,
    #[serde(default)]
    pub address: String,
}

/// A single log line as served by the history service and the live channel.
///
/// `id` is the identity used for de-duplication; `(timestamp, sequence_number)`
/// is the sort key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    pub id: String,
    pub timestamp: i64,
    pub sequence_number: i64,
    pub content: String,
    #[serde(default)]
    pub source: SourceInstance,
}

impl LogLine {
    /// The `(timestamp, sequence_number)` sort key.
    pub fn key(&self) -> (i64, i64) {
        (self.timestamp, self.sequence_number)
    }

    pub fn instance_id(&self) -> &str {
        &self.source.id
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::detect(&self.content)
    }
}

/// Comparison contract used by [`OrderedLines`](crate::container::OrderedLines).
///
/// Implementations must be a total order over the sort key; lines with equal
/// keys are kept in arrival order.
pub trait LineOrder {
    fn compare(&self, a: &LogLine, b: &LogLine) -> Ordering;
}

/// Oldest first. Used for scrollback.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ascending;

/// Newest first. Used for the recent-activity buffer.
#[derive(Clone, Copy, Debug, Default)]
pub struct Descending;

impl LineOrder for Ascending {
    fn compare(&self, a: &LogLine, b: &LogLine) -> Ordering {
        a.key().cmp(&b.key())
    }
}

impl LineOrder for Descending {
    fn compare(&self, a: &LogLine, b: &LogLine) -> Ordering {
        b.key().cmp(&a.key())
    }
}

/// Detected log level
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    None,
}

impl LogLevel {
    /// Detect log level from a line of text
    pub fn detect(line: &str) -> Self {
        let upper = line.to_uppercase();
        if upper.contains("ERROR") || upper.contains("[E]") || upper.contains("ERR]") {
            LogLevel::Error
        } else if upper.contains("WARN") || upper.contains("[W]") || upper.contains("WRN]") {
            LogLevel::Warn
        } else if upper.contains("INFO") || upper.contains("[I]") || upper.contains("INF]") {
            LogLevel::Info
        } else if upper.contains("DEBUG") || upper.contains("[D]") || upper.contains("DBG]") {
            LogLevel::Debug
        } else if upper.contains("TRACE") || upper.contains("[T]") || upper.contains("TRC]") {
            LogLevel::Trace
        } else {
            LogLevel::None
        }
    }
}

#[cfg(test)]
pub(crate) fn line(id: &str, timestamp: i64, sequence_number: i64) -> LogLine {
    LogLine {
        id: id.to_string(),
        timestamp,
        sequence_number,
        content: format!("line {id}"),
        source: SourceInstance {
            id: "api-1".to_string(),
            address: "10.0.0.1".to_string(),
        },
    }
}
