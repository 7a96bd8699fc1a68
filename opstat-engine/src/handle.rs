//! Producer handle for submitting samples.

use std::net::Ipv4Addr;

use opstat_types::Observation;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// One item on the ingestion queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// A completed operation.
    Observation(Observation),
    /// Add to a raw counter.
    Add { key: String, value: u64 },
    /// Overwrite a raw counter.
    Set { key: String, value: u64 },
    /// Add to a body matrix cell.
    Cell {
        row: String,
        column: String,
        value: u64,
    },
}

/// A cloneable handle for feeding the aggregator.
///
/// Obtain one from `Aggregator::submitter()` or `AggregatorHandle::submitter()`.
/// Every producer thread or task gets its own clone; samples from a single
/// submitter are applied in the order they were sent.
///
/// The blocking methods (`submit`, `push_stat`, `inc_stat`, `set_stat`,
/// `inc_cell`) park the calling thread while the queue is full. They panic
/// when called from inside an async context, so tasks should use
/// [`submit_async`](Self::submit_async) or [`send`](Self::send) instead.
///
/// # Example
///
/// ```rust,no_run
/// use opstat_engine::Aggregator;
/// use std::net::Ipv4Addr;
///
/// # fn main() -> opstat_engine::Result<()> {
/// let aggregator = Aggregator::builder().build()?;
/// let submitter = aggregator.submitter();
///
/// std::thread::spawn(move || {
///     submitter.push_stat("login", 12, Ipv4Addr::new(10, 0, 0, 1), 256, 0)
/// });
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Submitter {
    pub(crate) tx: mpsc::Sender<Sample>,
}

impl Submitter {
    /// Submit an observation, blocking while the queue is full.
    pub fn submit(&self, observation: Observation) -> Result<()> {
        check_operation(&observation)?;
        self.blocking(Sample::Observation(observation))
    }

    /// Submit an observation, waiting for queue space.
    pub async fn submit_async(&self, observation: Observation) -> Result<()> {
        check_operation(&observation)?;
        self.send(Sample::Observation(observation)).await
    }

    /// Submit an observation given as its individual fields.
    ///
    /// The observation is upstream with in-degree accounting.
    pub fn push_stat(
        &self,
        operation: &str,
        delay_ms: u64,
        source: Ipv4Addr,
        payload: u64,
        code: i32,
    ) -> Result<()> {
        self.submit(Observation::new(operation, delay_ms, source, payload, code))
    }

    /// Add `value` to a named counter.
    pub fn inc_stat(&self, key: impl Into<String>, value: u64) -> Result<()> {
        self.blocking(Sample::Add {
            key: key.into(),
            value,
        })
    }

    /// Overwrite a named counter.
    pub fn set_stat(&self, key: impl Into<String>, value: u64) -> Result<()> {
        self.blocking(Sample::Set {
            key: key.into(),
            value,
        })
    }

    /// Add `value` to the body matrix cell at `row`/`column`.
    pub fn inc_cell(
        &self,
        row: impl Into<String>,
        column: impl Into<String>,
        value: u64,
    ) -> Result<()> {
        self.blocking(Sample::Cell {
            row: row.into(),
            column: column.into(),
            value,
        })
    }

    /// Queue any sample, waiting for queue space.
    pub async fn send(&self, sample: Sample) -> Result<()> {
        if let Sample::Observation(obs) = &sample {
            check_operation(obs)?;
        }
        self.tx.send(sample).await.map_err(|_| Error::Closed)
    }

    /// True once the aggregator has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn blocking(&self, sample: Sample) -> Result<()> {
        self.tx.blocking_send(sample).map_err(|_| Error::Closed)
    }
}

impl std::fmt::Debug for Submitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submitter")
            .field("capacity", &self.tx.capacity())
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

fn check_operation(observation: &Observation) -> Result<()> {
    if observation.operation.is_empty() {
        return Err(Error::EmptyOperation);
    }
    Ok(())
}
