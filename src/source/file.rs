//! File-based observation source.
//!
//! Reads a newline-delimited JSON file from start to end.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use opstat_types::Observation;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use super::{parse_line, ObservationSource};

/// A source that reads observation records from a JSONL file.
///
/// The file is opened on the first read. Malformed lines are logged,
/// counted and skipped.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    description: String,
    lines: Option<Lines<BufReader<File>>>,
    line_number: u64,
    skipped: u64,
    last_error: Option<String>,
    done: bool,
}

impl FileSource {
    /// Create a new file source for the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let description = format!("file: {}", path.display());
        Self {
            path,
            description,
            lines: None,
            line_number: 0,
            skipped: 0,
            last_error: None,
            done: false,
        }
    }

    /// Returns the path being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&mut self) -> Option<()> {
        match File::open(&self.path).await {
            Ok(file) => {
                self.lines = Some(BufReader::new(file).lines());
                Some(())
            }
            Err(e) => {
                self.last_error = Some(format!("Read error: {}", e));
                self.done = true;
                None
            }
        }
    }
}

#[async_trait]
impl ObservationSource for FileSource {
    async fn next_observation(&mut self) -> Option<Observation> {
        if self.done {
            return None;
        }
        if self.lines.is_none() {
            self.open().await?;
        }
        let lines = self.lines.as_mut()?;

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    self.line_number += 1;
                    match parse_line(&line) {
                        Ok(Some(obs)) => return Some(obs),
                        Ok(None) => continue,
                        Err(e) => {
                            let message = format!("{e:#}");
                            tracing::warn!(
                                file = %self.path.display(),
                                line = self.line_number,
                                error = %message,
                                "skipping malformed record"
                            );
                            self.skipped += 1;
                            self.last_error = Some(format!("line {}: {}", self.line_number, message));
                        }
                    }
                }
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.last_error = Some(format!("Read error: {}", e));
                    self.done = true;
                    return None;
                }
            }
        }
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn skipped(&self) -> u64 {
        self.skipped
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}
