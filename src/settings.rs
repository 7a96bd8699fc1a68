//! Settings file loading.
//!
//! Settings come from an optional TOML file, overridden by `OPSTAT__`
//! prefixed environment variables (`OPSTAT__LOG__LEVEL=debug`).
//!
//! ```toml
//! interval = "60s"
//! queue_capacity = 1024
//!
//! [log]
//! level = "info"
//! path = "/var/log/opstat"
//! name_prefix = "svc"
//!
//! [thresholds]
//! delay_up = [100, 500, 1000]
//! timeout_ms = 3000
//!
//! [report]
//! rows = ["login", "query"]
//! error_rows = ["login"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use opstat_engine::{Aggregator, LogLevel, Output, ReportLayout, SinkConfig, Thresholds};
use serde::Deserialize;

use crate::duration::parse_duration;

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Report interval, e.g. "60s".
    pub interval: String,
    pub queue_capacity: usize,
    /// Emit one last report when the input ends.
    pub flush_on_exit: bool,
    pub log: LogSettings,
    pub thresholds: ThresholdSettings,
    pub report: ReportSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval: "60s".to_string(),
            queue_capacity: 1024,
            flush_on_exit: true,
            log: LogSettings::default(),
            thresholds: ThresholdSettings::default(),
            report: ReportSettings::default(),
        }
    }
}

/// The `[log]` table: severity and the rotating report file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    /// Directory for the report log. Without it, reports go to `tracing`.
    pub path: Option<PathBuf>,
    pub name_prefix: String,
    pub filename: String,
    pub max_lines: u64,
    pub max_size: u64,
    pub max_days: u64,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            path: None,
            name_prefix: String::new(),
            filename: "stat.log".to_string(),
            max_lines: 100_000,
            max_size: 256 * 1024 * 1024,
            max_days: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThresholdSettings {
    pub delay_up: [u64; 3],
    pub timeout_ms: u64,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        let defaults = Thresholds::default();
        Self {
            delay_up: defaults.delay_up,
            timeout_ms: defaults.timeout_ms,
        }
    }
}

/// The `[report]` table: which items each report section shows.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Extra header items, after `MsgIn` and `MsgOut`.
    pub head: Vec<String>,
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    /// Extra tail items, after the in-degree byte counts.
    pub tail: Vec<String>,
    /// Operations that get a per-code error breakdown.
    pub error_rows: Vec<String>,
    pub address_errors: bool,
    /// Also write each report as JSON to this file.
    pub json_path: Option<PathBuf>,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            head: Vec::new(),
            rows: Vec::new(),
            columns: Vec::new(),
            tail: Vec::new(),
            error_rows: Vec::new(),
            address_errors: true,
            json_path: None,
        }
    }
}

impl Settings {
    /// Load settings from `path` (if any) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(
                Environment::with_prefix("OPSTAT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| match path {
                Some(p) => format!("Failed to load settings from {}", p.display()),
                None => "Failed to load settings from the environment".to_string(),
            })?;

        config
            .try_deserialize()
            .context("Invalid settings")
    }

    /// Parse settings from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        Config::builder()
            .add_source(File::from_str(content, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
            .context("Invalid settings")
    }

    /// The report interval; reports count whole seconds, so fractions are rejected.
    pub fn interval(&self) -> Result<Duration> {
        let interval = parse_duration(&self.interval)
            .with_context(|| format!("Invalid interval: {}", self.interval))?;
        if interval.is_zero() {
            bail!("Interval must be greater than zero");
        }
        if interval.subsec_nanos() != 0 {
            bail!("Interval must be a whole number of seconds: {}", self.interval);
        }
        Ok(interval)
    }

    pub fn log_level(&self) -> Result<LogLevel> {
        self.log
            .level
            .parse()
            .with_context(|| format!("Invalid log level: {}", self.log.level))
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds::new(self.thresholds.delay_up, self.thresholds.timeout_ms)
    }

    /// Check everything the engine would reject, before anything starts.
    pub fn validate(&self) -> Result<()> {
        self.interval()?;
        self.log_level()?;
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be greater than zero");
        }
        self.thresholds().validate().context("Invalid [thresholds]")?;
        self.layout().validate().context("Invalid [report]")?;
        if self.log.path.is_some() {
            self.sink_config()?.validate().context("Invalid [log]")?;
        }
        Ok(())
    }

    fn sink_config(&self) -> Result<SinkConfig> {
        let dir = self.log.path.clone().unwrap_or_default();
        Ok(SinkConfig::new(dir, &self.log.name_prefix, &self.log.filename)
            .level(self.log_level()?)
            .max_lines(self.log.max_lines)
            .max_size(self.log.max_size)
            .max_days(self.log.max_days))
    }

    /// The report layout: the standard items plus everything configured.
    pub fn layout(&self) -> ReportLayout {
        let mut layout = ReportLayout::standard();
        for item in &self.report.head {
            layout.add_head_item(item.as_str());
        }
        for item in &self.report.rows {
            layout.add_row_item(item.as_str());
        }
        for item in &self.report.columns {
            layout.add_column_item(item.as_str());
        }
        for item in &self.report.tail {
            layout.add_tail_item(item.as_str());
        }
        layout.set_address_errors(self.report.address_errors);
        layout
    }

    /// Build an aggregator from these settings, ready to start.
    pub fn build_aggregator(&self) -> Result<Aggregator> {
        self.validate()?;
        let thresholds = self.thresholds();

        let mut builder = Aggregator::builder()
            .interval(self.interval()?)
            .queue_capacity(self.queue_capacity)
            .delay_thresholds(
                thresholds.delay_up[0],
                thresholds.delay_up[1],
                thresholds.delay_up[2],
            )
            .timeout(thresholds.timeout_ms)
            .layout(self.layout());

        builder = match self.log.path {
            Some(_) => builder.output(Output::log_file(self.sink_config()?)),
            None => builder.output(Output::tracing()),
        };
        if let Some(path) = &self.report.json_path {
            builder = builder.output(Output::json(path));
        }

        let mut aggregator = builder.build().context("Failed to build aggregator")?;
        for row in &self.report.error_rows {
            aggregator.register_error_row(row.as_str());
        }
        Ok(aggregator)
    }
}
