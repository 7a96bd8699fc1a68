//! Observation sources for the command line tool.
//!
//! This module provides a trait-based abstraction for reading observations
//! from files, network streams, or standard input, and a [`feed`] loop that
//! submits them to a running aggregator.

mod file;
mod record;
mod stream;

pub use file::FileSource;
pub use record::{parse_line, ObservationRecord};
pub use stream::StreamSource;

use std::fmt::Debug;

use anyhow::Result;
use async_trait::async_trait;
use opstat_engine::Submitter;
use opstat_types::Observation;

/// Trait for reading observations from various sources.
///
/// Malformed records are skipped and counted rather than ending the input.
///
/// # Example
///
/// ```no_run
/// use opstat::{FileSource, ObservationSource};
///
/// # tokio_test::block_on(async {
/// let mut source = FileSource::new("observations.jsonl");
/// while let Some(obs) = source.next_observation().await {
///     println!("{} took {}ms", obs.operation, obs.delay.as_millis());
/// }
/// # });
/// ```
#[async_trait]
pub trait ObservationSource: Send + Debug {
    /// Read the next observation.
    ///
    /// Returns `None` at end of input or after a read error.
    async fn next_observation(&mut self) -> Option<Observation>;

    /// Returns a human-readable description of the source.
    fn description(&self) -> &str;

    /// Number of records skipped because they could not be parsed.
    fn skipped(&self) -> u64;

    /// The most recent read or parse error, if any.
    fn last_error(&self) -> Option<String>;
}

/// Counts from one [`feed`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    pub submitted: u64,
    pub skipped: u64,
}

/// Submit every observation from `source` until it is exhausted.
///
/// Fails only when the aggregator stops accepting samples.
pub async fn feed(source: &mut dyn ObservationSource, submitter: &Submitter) -> Result<FeedSummary> {
    let mut submitted = 0;
    while let Some(obs) = source.next_observation().await {
        submitter.submit_async(obs).await?;
        submitted += 1;
    }

    if let Some(error) = source.last_error() {
        tracing::debug!(source = source.description(), error = %error, "input ended");
    }

    Ok(FeedSummary {
        submitted,
        skipped: source.skipped(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use opstat_engine::Aggregator;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_feed_submits_and_counts() {
        let data = concat!(
            r#"{"op":"login","delay_ms":5,"source":"10.0.0.1"}"#,
            "\n",
            "garbage\n",
            r#"{"op":"login","delay_ms":7,"source":"10.0.0.2","code":404}"#,
            "\n",
        );
        let mut source = StreamSource::spawn(Cursor::new(data), "test");

        let mut aggregator = Aggregator::builder().build().unwrap();
        aggregator.register_error_row("login");
        let handle = aggregator.start();

        let summary = feed(&mut source, &handle.submitter()).await.unwrap();
        assert_eq!(
            summary,
            FeedSummary {
                submitted: 2,
                skipped: 1
            }
        );

        let state = handle.inspect().await.unwrap();
        assert_eq!(state.get_stat("login"), 2);
        assert_eq!(state.code_total(404), 1);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_feed_fails_after_stop() {
        let data = r#"{"op":"login","delay_ms":5,"source":"10.0.0.1"}"#;
        let mut source = StreamSource::spawn(Cursor::new(data), "test");

        let handle = Aggregator::builder().build().unwrap().start();
        let submitter = handle.submitter();
        handle.stop().await.unwrap();

        assert!(feed(&mut source, &submitter).await.is_err());
    }
}
