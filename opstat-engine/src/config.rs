//! Setup-time configuration: severity levels, sink parameters and thresholds.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Severity levels accepted for the report log, most severe first.
///
/// A sink configured at a given level writes every message whose severity is
/// at least that high. Reports are informational, so a sink configured at
/// `notice` or stricter drops them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warn,
    Notice,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    /// Whether a message of severity `message` passes a filter set to `self`.
    pub fn permits(self, message: LogLevel) -> bool {
        message <= self
    }

    /// Closest `tracing` level, used when the report is routed through tracing.
    pub fn as_tracing(self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info | LogLevel::Notice => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error | LogLevel::Critical | LogLevel::Alert | LogLevel::Emergency => {
                tracing::Level::ERROR
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Emergency => "emergency",
            LogLevel::Alert => "alert",
            LogLevel::Critical => "critical",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Notice => "notice",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "notice" => Ok(LogLevel::Notice),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "critical" => Ok(LogLevel::Critical),
            "alert" => Ok(LogLevel::Alert),
            "emergency" => Ok(LogLevel::Emergency),
            _ => Err(Error::InvalidLevel(s.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how the rotating report log is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    /// Directory holding the log file.
    pub dir: PathBuf,
    /// Prefix joined to `filename` with an underscore.
    pub name_prefix: String,
    pub filename: String,
    pub level: LogLevel,
    /// Rotate before the file would exceed this many lines (0 = unlimited).
    pub max_lines: u64,
    /// Rotate before the file would exceed this many bytes (0 = unlimited).
    pub max_size: u64,
    /// Delete rotated files older than this many days (0 = keep forever).
    pub max_days: u64,
}

impl SinkConfig {
    /// A sink writing `<dir>/<prefix>_<filename>` at `info` with no limits.
    pub fn new(
        dir: impl Into<PathBuf>,
        name_prefix: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            name_prefix: name_prefix.into(),
            filename: filename.into(),
            level: LogLevel::Info,
            max_lines: 0,
            max_size: 0,
            max_days: 0,
        }
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn max_lines(mut self, max_lines: u64) -> Self {
        self.max_lines = max_lines;
        self
    }

    pub fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn max_days(mut self, max_days: u64) -> Self {
        self.max_days = max_days;
        self
    }

    /// Full path of the active log file.
    pub fn file_path(&self) -> PathBuf {
        let name = if self.name_prefix.is_empty() {
            self.filename.clone()
        } else {
            format!("{}_{}", self.name_prefix, self.filename)
        };
        self.dir.join(name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.filename.trim().is_empty() {
            return Err(Error::Config("sink filename must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Delay thresholds applied by the update rule, all in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Bucket thresholds; each one exceeded bumps its own counter.
    pub delay_up: [u64; 3],
    /// Observations slower than this count as timeouts.
    pub timeout_ms: u64,
}

impl Thresholds {
    pub fn new(delay_up: [u64; 3], timeout_ms: u64) -> Self {
        Self {
            delay_up,
            timeout_ms,
        }
    }

    /// Bucket thresholds must be non-decreasing.
    pub fn validate(&self) -> Result<()> {
        let [a, b, c] = self.delay_up;
        if a > b || b > c {
            return Err(Error::Config(format!(
                "delay thresholds must be ascending, got {a}, {b}, {c}"
            )));
        }
        Ok(())
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            delay_up: [100, 500, 1000],
            timeout_ms: 3000,
        }
    }
}
