//! # opstat
//!
//! Command line front end for the opstat aggregation engine.
//!
//! Reads newline-delimited JSON observation records from a file, a TCP
//! stream or standard input, feeds them to an aggregator configured from a
//! settings file, and writes a statistics report every interval.
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Aggregate a file of records with one-minute reports
//! opstat --config opstat.toml --input observations.jsonl
//!
//! # Aggregate a live feed
//! opstat --connect localhost:9090 --interval 10s
//!
//! # Pipe records through standard input
//! producer | opstat --log-level debug
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use opstat::{feed, FileSource, Settings};
//!
//! # tokio_test::block_on(async {
//! let settings = Settings::load(Some(std::path::Path::new("opstat.toml"))).unwrap();
//! let handle = settings.build_aggregator().unwrap().start();
//!
//! let mut source = FileSource::new("observations.jsonl");
//! let summary = feed(&mut source, &handle.submitter()).await.unwrap();
//! println!("submitted {} observations", summary.submitted);
//!
//! handle.flush_now().await.unwrap();
//! handle.stop().await.unwrap();
//! # });
//! ```

pub mod duration;
pub mod settings;
pub mod source;

pub use settings::Settings;
pub use source::{
    feed, parse_line, FeedSummary, FileSource, ObservationRecord, ObservationSource,
    StreamSource,
};
