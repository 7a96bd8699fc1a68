//! # opstat-engine
//!
//! In-process operation statistics with periodic reports.
//!
//! Producers on any thread submit one observation per completed operation
//! (name, delay, source address, payload size, outcome code). A single
//! aggregator task folds them into counters and, once per interval, renders
//! a report, writes it to the configured outputs and resets for the next
//! interval.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use opstat_engine::{Aggregator, LogLevel, Output, SinkConfig};
//! use std::net::Ipv4Addr;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> opstat_engine::Result<()> {
//!     let sink = SinkConfig::new("/var/log/opstat", "svc", "stat.log").level(LogLevel::Info);
//!
//!     let mut aggregator = Aggregator::builder()
//!         .output(Output::log_file(sink))
//!         .interval(Duration::from_secs(60))
//!         .delay_thresholds(100, 500, 1000)
//!         .timeout(3000)
//!         .build()?;
//!
//!     aggregator.add_row_item("login");
//!     aggregator.register_error_row("login");
//!
//!     let handle = aggregator.start();
//!     let submitter = handle.submitter();
//!
//!     // Record each operation as it completes
//!     submitter
//!         .submit_async(opstat_engine::Observation::new(
//!             "login",
//!             42,
//!             Ipv4Addr::new(10, 0, 0, 1),
//!             512,
//!             0,
//!         ))
//!         .await?;
//!
//!     // ... your application runs ...
//!
//!     handle.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Bounded queue**: producers block when the aggregator falls behind
//! - **Single writer**: all counters live in one task, no locking on the hot path
//! - **Multiple outputs**: rotating log file, JSON file, `tracing`, or a channel
//! - **Deterministic reports**: ranked lists break ties by ascending key

mod aggregator;
mod config;
mod error;
mod handle;
mod layout;
mod output;
mod render;
mod state;
mod topn;

pub use aggregator::{Aggregator, AggregatorBuilder, AggregatorHandle};
pub use config::{LogLevel, SinkConfig, Thresholds};
pub use error::{Error, Result};
pub use handle::{Sample, Submitter};
pub use layout::ReportLayout;
pub use output::{Output, RollingFile};
pub use render::{build_report, render_lines, render_text, ADDRESS_SLOTS, ERROR_SLOTS};
pub use state::{keys, StatState, TimeStat};
pub use topn::top_n;

// Re-export types for convenience
pub use opstat_types::{
    decode_addr, encode_addr, Degree, Direction, Milliseconds, Observation, Report,
};
