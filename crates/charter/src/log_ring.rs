//! Capped in-memory log for export.
//!
//! Every record also goes to the `log` facade, so the ring is only a
//! retained copy; nothing reads it back for correctness.

use std::collections::VecDeque;
use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub data: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct LogRing {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Record an entry, evicting the oldest one when full.
    pub fn record(&mut self, level: LogLevel, message: impl Into<String>, data: Option<Value>) {
        let message = message.into();
        match &data {
            Some(data) => log::log!(level.into(), "{} {}", message, data),
            None => log::log!(level.into(), "{}", message),
        }

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            timestamp: Utc::now(),
            level,
            message,
            data,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.record(LogLevel::Info, message, None);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.record(LogLevel::Warn, message, None);
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Plain-text dump: `[timestamp] LEVEL: message`, an optional
    /// `Data:` line with pretty JSON, entries separated by a blank line.
    pub fn export_text(&self) -> String {
        let mut out = String::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push_str("\n\n");
            }
            let _ = write!(
                out,
                "[{}] {}: {}",
                entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                entry.level.as_str(),
                entry.message
            );
            if let Some(data) = &entry.data {
                let pretty = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
                let _ = write!(out, "\nData: {pretty}");
            }
        }
        out
    }

    /// File name for an export taken at `now`.
    pub fn export_file_name(now: DateTime<Utc>) -> String {
        format!("charter_logs_{}.txt", now.format("%Y-%m-%dT%H-%M-%S"))
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new(1000)
    }
}
