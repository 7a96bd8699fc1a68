//! Output backends for emitting reports.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use opstat_types::Report;
use tokio::io::AsyncWriteExt;

use crate::config::{LogLevel, SinkConfig};
use crate::error::Result;

/// Output destination for reports.
///
/// Configure where the aggregator writes each interval's report. Outputs are
/// written one after another inside the aggregator task, so a slow output
/// delays ingestion until it finishes.
#[derive(Debug)]
pub enum Output {
    /// Append the text report to a rotating log file.
    LogFile(RollingFile),

    /// Write the structured report as pretty JSON.
    ///
    /// The file is overwritten with each report.
    Json(PathBuf),

    /// Emit each text line as a `tracing` event on target `opstat::report`.
    Tracing,

    /// Send structured reports through a channel.
    ///
    /// Use `Output::channel()` to create this variant and get the receiver.
    Channel(tokio::sync::mpsc::Sender<Report>),
}

impl Output {
    /// Create a rotating log file output.
    ///
    /// # Example
    ///
    /// ```rust
    /// use opstat_engine::{Output, SinkConfig};
    ///
    /// let output = Output::log_file(SinkConfig::new("/tmp", "svc", "stat.log").max_lines(10_000));
    /// ```
    pub fn log_file(config: SinkConfig) -> Self {
        Output::LogFile(RollingFile::new(config))
    }

    /// Create a JSON file output.
    pub fn json(path: impl Into<PathBuf>) -> Self {
        Output::Json(path.into())
    }

    pub fn tracing() -> Self {
        Output::Tracing
    }

    /// Create a channel output and return both the output and receiver.
    ///
    /// # Example
    ///
    /// ```rust
    /// use opstat_engine::Output;
    ///
    /// let (output, mut rx) = Output::channel(16);
    ///
    /// // Later, receive reports
    /// // while let Some(report) = rx.recv().await {
    /// //     println!("{} operations", report.operations.len());
    /// // }
    /// ```
    pub fn channel(buffer: usize) -> (Self, tokio::sync::mpsc::Receiver<Report>) {
        let (tx, rx) = tokio::sync::mpsc::channel(buffer);
        (Output::Channel(tx), rx)
    }

    /// Emit a report to this output.
    pub(crate) async fn emit(&mut self, report: &Report, text: &str) -> Result<()> {
        match self {
            Output::LogFile(file) => file.write(text).await?,
            Output::Json(path) => {
                let json = serde_json::to_string_pretty(report).map_err(io::Error::from)?;
                tokio::fs::write(path, json).await?;
            }
            Output::Tracing => {
                for line in text.lines() {
                    tracing::info!(target: "opstat::report", "{}", line);
                }
            }
            Output::Channel(tx) => {
                // Best effort send (don't block if channel is full)
                let _ = tx.try_send(report.clone());
            }
        }
        Ok(())
    }
}

/// Log file that rotates by line count and size and prunes old rotations.
///
/// Rotated files are renamed to `<file>.<YYYY-MM-DD>.<NNN>`.
#[derive(Debug)]
pub struct RollingFile {
    config: SinkConfig,
    path: PathBuf,
    lines: u64,
    size: u64,
    opened: bool,
}

impl RollingFile {
    pub fn new(config: SinkConfig) -> Self {
        let path = config.file_path();
        Self {
            config,
            path,
            lines: 0,
            size: 0,
            opened: false,
        }
    }

    /// Path of the active file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `text`, rotating first if it would push the file over a limit.
    ///
    /// Reports are informational; nothing is written when the configured
    /// level filters out `info`.
    pub async fn write(&mut self, text: &str) -> io::Result<()> {
        if !self.config.level.permits(LogLevel::Info) {
            return Ok(());
        }

        if !self.opened {
            self.open_existing().await?;
        }

        let add_lines = text.matches('\n').count() as u64;
        let add_size = text.len() as u64;
        if self.would_overflow(add_lines, add_size) {
            self.rotate().await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;

        self.lines += add_lines;
        self.size += add_size;
        Ok(())
    }

    /// Pick up the size and line count of a file left by a previous run.
    async fn open_existing(&mut self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.config.dir).await?;
        match tokio::fs::read(&self.path).await {
            Ok(content) => {
                self.size = content.len() as u64;
                self.lines = content.iter().filter(|&&b| b == b'\n').count() as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.opened = true;
        Ok(())
    }

    fn would_overflow(&self, add_lines: u64, add_size: u64) -> bool {
        if self.lines == 0 && self.size == 0 {
            return false;
        }
        let max_lines = self.config.max_lines;
        let max_size = self.config.max_size;
        (max_lines > 0 && self.lines + add_lines > max_lines)
            || (max_size > 0 && self.size + add_size > max_size)
    }

    async fn rotate(&mut self) -> io::Result<()> {
        let date = chrono::Local::now().format("%Y-%m-%d").to_string();
        let mut seq = 1u32;
        let target = loop {
            let candidate = rotated_name(&self.path, &date, seq);
            if !tokio::fs::try_exists(&candidate).await? {
                break candidate;
            }
            seq += 1;
        };

        tokio::fs::rename(&self.path, &target).await?;
        tracing::debug!(from = %self.path.display(), to = %target.display(), "rotated report log");
        self.lines = 0;
        self.size = 0;

        if self.config.max_days > 0 {
            self.prune().await?;
        }
        Ok(())
    }

    /// Delete rotated files older than `max_days`.
    async fn prune(&self) -> io::Result<()> {
        let Some(active) = self.path.file_name().and_then(|n| n.to_str()) else {
            return Ok(());
        };
        let prefix = format!("{active}.");
        let max_age = Duration::from_secs(self.config.max_days.saturating_mul(24 * 60 * 60));
        let now = SystemTime::now();

        let mut entries = tokio::fs::read_dir(&self.config.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(&prefix) {
                continue;
            }
            let modified = entry.metadata().await?.modified()?;
            let expired = now
                .duration_since(modified)
                .map(|age| age > max_age)
                .unwrap_or(false);
            if expired {
                tracing::debug!(file = %name, "removing expired report log");
                tokio::fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }
}

fn rotated_name(path: &Path, date: &str, seq: u32) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{date}.{seq:03}"));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ReportLayout;
    use crate::render::{build_report, render_text};
    use crate::state::StatState;
    use tempfile::TempDir;

    fn empty_report() -> Report {
        build_report(&StatState::default(), &ReportLayout::standard(), 60, 0)
    }

    fn rotated_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.contains(".log."))
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn log_file_appends_reports() {
        let dir = TempDir::new().unwrap();
        let mut output = Output::log_file(SinkConfig::new(dir.path(), "svc", "stat.log"));
        let report = empty_report();
        let text = render_text(&report);

        output.emit(&report, &text).await.unwrap();
        output.emit(&report, &text).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("svc_stat.log")).unwrap();
        assert_eq!(written.matches("Head Information").count(), 2);
        assert!(rotated_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn log_file_rotates_on_line_limit() {
        let dir = TempDir::new().unwrap();
        let config = SinkConfig::new(dir.path(), "svc", "stat.log").max_lines(3);
        let mut file = RollingFile::new(config);

        file.write("one\ntwo\n").await.unwrap();
        file.write("three\nfour\n").await.unwrap();
        file.write("five\n").await.unwrap();

        let active = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(active, "three\nfour\nfive\n");

        let rotated = rotated_files(dir.path());
        assert_eq!(rotated.len(), 1);
        assert!(rotated[0].ends_with(".001"));
        let old = std::fs::read_to_string(dir.path().join(&rotated[0])).unwrap();
        assert_eq!(old, "one\ntwo\n");
    }

    #[tokio::test]
    async fn log_file_rotates_on_size_limit() {
        let dir = TempDir::new().unwrap();
        let config = SinkConfig::new(dir.path(), "", "stat.log").max_size(10);
        let mut file = RollingFile::new(config);

        file.write("0123456789\n").await.unwrap();
        file.write("abc\n").await.unwrap();
        file.write("def\n").await.unwrap();

        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "abc\ndef\n");
        assert_eq!(rotated_files(dir.path()).len(), 1);
    }

    #[tokio::test]
    async fn huge_retention_keeps_rotated_files() {
        let dir = TempDir::new().unwrap();
        let config = SinkConfig::new(dir.path(), "svc", "stat.log")
            .max_lines(1)
            .max_days(u64::MAX);
        let mut file = RollingFile::new(config);

        file.write("one\n").await.unwrap();
        file.write("two\n").await.unwrap();
        file.write("three\n").await.unwrap();

        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "three\n");
        assert_eq!(rotated_files(dir.path()).len(), 2);
    }

    #[tokio::test]
    async fn unwritable_json_path_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let mut output = Output::json(dir.path().join("missing").join("last.json"));

        let result = output.emit(&empty_report(), "").await;
        assert!(matches!(result, Err(crate::error::Error::Io(_))));
    }

    #[tokio::test]
    async fn strict_level_suppresses_reports() {
        let dir = TempDir::new().unwrap();
        let config = SinkConfig::new(dir.path(), "svc", "stat.log").level(LogLevel::Warn);
        let mut file = RollingFile::new(config);

        file.write("report\n").await.unwrap();
        assert!(!file.path().exists());
    }

    #[tokio::test]
    async fn json_output_overwrites_with_latest_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("last.json");
        let mut output = Output::json(&path);

        let mut report = empty_report();
        output.emit(&report, "").await.unwrap();
        report.interval_secs = 5;
        output.emit(&report, "").await.unwrap();

        let parsed: Report =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, report);
    }

    #[tokio::test]
    async fn channel_output_drops_when_full() {
        let (mut output, mut rx) = Output::channel(1);
        let report = empty_report();

        output.emit(&report, "").await.unwrap();
        output.emit(&report, "").await.unwrap();

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
