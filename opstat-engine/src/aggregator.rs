//! The aggregator: setup, the consuming task, and its control handle.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use opstat_types::Report;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::Thresholds;
use crate::error::{Error, Result};
use crate::handle::{Sample, Submitter};
use crate::layout::ReportLayout;
use crate::output::Output;
use crate::render::{build_report, render_text};
use crate::state::{keys, StatState};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Requests carried by the control channel.
#[derive(Debug)]
enum Control {
    Flush(oneshot::Sender<Report>),
    ClearAll,
    Inspect(oneshot::Sender<StatState>),
    Shutdown,
}

/// Collects observations and emits a report every interval.
///
/// An `Aggregator` is the setup phase: register report items and error rows,
/// hand out submitters, then call [`start`](Self::start). Starting consumes
/// the value, so the layout cannot change once samples are being applied.
///
/// # Example
///
/// ```rust,no_run
/// use opstat_engine::{Aggregator, Output};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> opstat_engine::Result<()> {
///     let mut aggregator = Aggregator::builder()
///         .output(Output::tracing())
///         .interval(Duration::from_secs(10))
///         .build()?;
///
///     aggregator.add_row_item("login");
///     aggregator.register_error_row("login");
///
///     let handle = aggregator.start();
///     let submitter = handle.submitter();
///     // ... hand the submitter to producers ...
///
///     let state = handle.stop().await?;
///     println!("{} login requests in the last partial interval", state.get_stat("login"));
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Aggregator {
    state: StatState,
    layout: ReportLayout,
    outputs: Vec<Output>,
    interval: Duration,
    samples_tx: mpsc::Sender<Sample>,
    samples_rx: mpsc::Receiver<Sample>,
}

impl Aggregator {
    /// Create a builder for configuring the aggregator.
    pub fn builder() -> AggregatorBuilder {
        AggregatorBuilder::new()
    }

    /// A handle for submitting samples.
    ///
    /// Samples may be submitted before `start`; they wait in the queue, and
    /// producers block once it is full.
    pub fn submitter(&self) -> Submitter {
        Submitter {
            tx: self.samples_tx.clone(),
        }
    }

    pub fn add_head_item(&mut self, name: impl Into<String>) {
        self.layout.add_head_item(name);
    }

    pub fn add_row_item(&mut self, name: impl Into<String>) {
        self.layout.add_row_item(name);
    }

    /// Add a body column. Names used by the per-operation delay counters,
    /// such as `tcount`, are rejected.
    pub fn add_column_item(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if keys::is_reserved(&name) {
            return Err(Error::Config(format!(
                "column name is reserved for delay counters: {name}"
            )));
        }
        self.layout.add_column_item(name);
        Ok(())
    }

    pub fn add_tail_item(&mut self, name: impl Into<String>) {
        self.layout.add_tail_item(name);
    }

    /// Collect a per-code breakdown for `operation`.
    ///
    /// Registering an operation that is already registered empties its
    /// breakdown.
    pub fn register_error_row(&mut self, operation: impl Into<String>) {
        self.state.register_error_row(operation);
    }

    /// Toggle the per-code source address section of the report.
    pub fn enable_address_errors(&mut self, enabled: bool) {
        self.layout.set_address_errors(enabled);
    }

    /// Replace the three delay bucket thresholds.
    pub fn set_delay_thresholds(&mut self, first: u64, second: u64, third: u64) -> Result<()> {
        let thresholds = Thresholds::new([first, second, third], self.state.thresholds().timeout_ms);
        thresholds.validate()?;
        self.state.set_thresholds(thresholds);
        Ok(())
    }

    pub fn set_timeout(&mut self, timeout_ms: u64) {
        let mut thresholds = self.state.thresholds();
        thresholds.timeout_ms = timeout_ms;
        self.state.set_thresholds(thresholds);
    }

    pub fn layout(&self) -> &ReportLayout {
        &self.layout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the aggregator task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> AggregatorHandle {
        let (control_tx, control_rx) = mpsc::channel(16);
        let last_report = Arc::new(RwLock::new(None));
        let submitter = self.submitter();

        let worker = Worker {
            state: self.state,
            layout: self.layout,
            outputs: self.outputs,
            interval: self.interval,
            last_report: last_report.clone(),
        };

        tracing::debug!(
            interval_ms = self.interval.as_millis() as u64,
            outputs = worker.outputs.len(),
            "starting aggregator"
        );

        // The aggregator's own sender is dropped here; the handle keeps one.
        let task = tokio::spawn(worker.run(self.samples_rx, control_rx));

        AggregatorHandle {
            control: control_tx,
            submitter,
            last_report,
            task,
        }
    }
}

/// Builder for configuring an Aggregator.
#[derive(Debug)]
pub struct AggregatorBuilder {
    outputs: Vec<Output>,
    interval: Option<Duration>,
    queue_capacity: Option<usize>,
    thresholds: Thresholds,
    layout: Option<ReportLayout>,
}

impl AggregatorBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            outputs: Vec::new(),
            interval: None,
            queue_capacity: None,
            thresholds: Thresholds::default(),
            layout: None,
        }
    }

    /// Add an output destination.
    ///
    /// Multiple outputs can be added; reports are written to each in order.
    pub fn output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    /// Set the report interval.
    ///
    /// Reports state their interval in seconds, so `build` rejects anything
    /// that is not a positive whole number of seconds. Defaults to 60 seconds
    /// if not specified.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Set the ingestion queue capacity. Defaults to 1024.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn delay_thresholds(mut self, first: u64, second: u64, third: u64) -> Self {
        self.thresholds.delay_up = [first, second, third];
        self
    }

    pub fn timeout(mut self, timeout_ms: u64) -> Self {
        self.thresholds.timeout_ms = timeout_ms;
        self
    }

    /// Start from a prepared layout instead of [`ReportLayout::standard`].
    pub fn layout(mut self, layout: ReportLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Build the aggregator.
    pub fn build(self) -> Result<Aggregator> {
        let interval = self.interval.unwrap_or(DEFAULT_INTERVAL);
        if interval.is_zero() || interval.subsec_nanos() != 0 {
            return Err(Error::Config(format!(
                "interval must be a positive whole number of seconds, got {interval:?}"
            )));
        }
        let capacity = self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY);
        if capacity == 0 {
            return Err(Error::Config(
                "queue capacity must be greater than zero".to_string(),
            ));
        }
        self.thresholds.validate()?;
        let layout = self.layout.unwrap_or_else(ReportLayout::standard);
        layout.validate()?;

        let (samples_tx, samples_rx) = mpsc::channel(capacity);
        Ok(Aggregator {
            state: StatState::new(self.thresholds),
            layout,
            outputs: self.outputs,
            interval,
            samples_tx,
            samples_rx,
        })
    }
}

impl Default for AggregatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for controlling a running aggregator.
///
/// Dropping the handle without calling [`stop`](Self::stop) also shuts the
/// task down, but the final state is lost.
#[derive(Debug)]
pub struct AggregatorHandle {
    control: mpsc::Sender<Control>,
    submitter: Submitter,
    last_report: Arc<RwLock<Option<Report>>>,
    task: JoinHandle<StatState>,
}

impl AggregatorHandle {
    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    /// Run a flush cycle now and return its report.
    ///
    /// Counters are reset exactly as for a timer flush. The flush timer is
    /// not rearmed.
    pub async fn flush_now(&self) -> Result<Report> {
        let (tx, rx) = oneshot::channel();
        self.request(Control::Flush(tx)).await?;
        rx.await.map_err(|_| Error::Closed)
    }

    /// Clear every counter without producing a report.
    pub async fn clear_all(&self) -> Result<()> {
        self.request(Control::ClearAll).await
    }

    /// A copy of the state as of the moment the request is handled.
    pub async fn inspect(&self) -> Result<StatState> {
        let (tx, rx) = oneshot::channel();
        self.request(Control::Inspect(tx)).await?;
        rx.await.map_err(|_| Error::Closed)
    }

    /// The most recently emitted report, if any flush has happened yet.
    pub fn last_report(&self) -> Option<Report> {
        self.last_report.read().clone()
    }

    /// Stop the aggregator and return its final state.
    ///
    /// Samples still queued are discarded, and the partial interval is not
    /// reported. Submitting afterwards fails with [`Error::Closed`].
    pub async fn stop(self) -> Result<StatState> {
        // A closed control channel means the task is already gone; the
        // join below reports why.
        let _ = self.control.send(Control::Shutdown).await;
        self.task
            .await
            .map_err(|e| Error::TaskFailed(e.to_string()))
    }

    async fn request(&self, control: Control) -> Result<()> {
        self.control.send(control).await.map_err(|_| Error::Closed)
    }
}

/// State moved into the aggregator task.
struct Worker {
    state: StatState,
    layout: ReportLayout,
    outputs: Vec<Output>,
    interval: Duration,
    last_report: Arc<RwLock<Option<Report>>>,
}

impl Worker {
    async fn run(
        mut self,
        mut samples: mpsc::Receiver<Sample>,
        mut control: mpsc::Receiver<Control>,
    ) -> StatState {
        let timer = tokio::time::sleep(self.interval);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                () = &mut timer => {
                    self.flush().await;
                    timer.as_mut().reset(tokio::time::Instant::now() + self.interval);
                }
                request = control.recv() => match request {
                    Some(Control::Flush(reply)) => {
                        self.drain(&mut samples);
                        let report = self.flush().await;
                        let _ = reply.send(report);
                    }
                    Some(Control::ClearAll) => {
                        self.drain(&mut samples);
                        self.state.clear_all();
                    }
                    Some(Control::Inspect(reply)) => {
                        self.drain(&mut samples);
                        let _ = reply.send(self.state.clone());
                    }
                    Some(Control::Shutdown) | None => break,
                },
                Some(sample) = samples.recv() => self.apply(sample),
            }
        }

        tracing::debug!(discarded = samples.len(), "aggregator stopped");
        self.state
    }

    /// Apply the samples already queued when a request arrives, so a
    /// producer that submits and then asks for a flush sees its own samples.
    fn drain(&mut self, samples: &mut mpsc::Receiver<Sample>) {
        for _ in 0..samples.len() {
            match samples.try_recv() {
                Ok(sample) => self.apply(sample),
                Err(_) => break,
            }
        }
    }

    fn apply(&mut self, sample: Sample) {
        match sample {
            Sample::Observation(obs) => self.state.apply(&obs),
            Sample::Add { key, value } => self.state.inc_stat(&key, value),
            Sample::Set { key, value } => self.state.set_stat(&key, value),
            Sample::Cell { row, column, value } => self.state.inc_cell(&row, &column, value),
        }
    }

    async fn flush(&mut self) -> Report {
        let report = build_report(
            &self.state,
            &self.layout,
            self.interval.as_secs(),
            now_millis(),
        );
        let text = render_text(&report);

        for output in &mut self.outputs {
            if let Err(e) = output.emit(&report, &text).await {
                tracing::warn!(error = %e, "failed to write report");
            }
        }

        *self.last_report.write() = Some(report.clone());
        self.state.reset();
        report
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opstat_types::Observation;
    use std::net::Ipv4Addr;

    const SRC: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 7);

    fn obs(name: &str, delay: u64, code: i32) -> Observation {
        Observation::new(name, delay, SRC, 10, code)
    }

    #[test]
    fn builder_defaults() {
        let aggregator = Aggregator::builder().build().unwrap();
        assert_eq!(aggregator.interval(), Duration::from_secs(60));
        assert_eq!(aggregator.layout(), &ReportLayout::standard());
        assert!(aggregator.outputs.is_empty());
        assert_eq!(aggregator.samples_tx.max_capacity(), 1024);
    }

    #[test]
    fn builder_rejects_bad_parameters() {
        let zero_interval = Aggregator::builder().interval(Duration::ZERO).build();
        assert!(matches!(zero_interval, Err(Error::Config(_))));

        for fractional in [Duration::from_millis(500), Duration::from_millis(1500)] {
            let result = Aggregator::builder().interval(fractional).build();
            assert!(matches!(result, Err(Error::Config(_))), "{fractional:?}");
        }

        let zero_capacity = Aggregator::builder().queue_capacity(0).build();
        assert!(matches!(zero_capacity, Err(Error::Config(_))));

        let descending = Aggregator::builder().delay_thresholds(30, 20, 10).build();
        assert!(matches!(descending, Err(Error::Config(_))));

        let mut layout = ReportLayout::standard();
        layout.add_column_item("tcount");
        let reserved = Aggregator::builder().layout(layout).build();
        assert!(matches!(reserved, Err(Error::Config(_))));
    }

    #[test]
    fn reserved_column_rejected_during_setup() {
        let mut aggregator = Aggregator::builder().build().unwrap();
        aggregator.add_column_item("ok").unwrap();
        let result = aggregator.add_column_item("de_total_ms");
        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(aggregator.layout().columns(), ["ok"]);
    }

    #[test]
    fn setup_thresholds() {
        let mut aggregator = Aggregator::builder().build().unwrap();
        aggregator.set_delay_thresholds(1, 2, 3).unwrap();
        aggregator.set_timeout(9);
        assert_eq!(aggregator.state.thresholds(), Thresholds::new([1, 2, 3], 9));
        assert!(aggregator.set_delay_thresholds(5, 4, 6).is_err());
        assert_eq!(aggregator.state.thresholds().delay_up, [1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_flush_emits_and_resets() {
        let (output, mut rx) = Output::channel(4);
        let mut aggregator = Aggregator::builder()
            .output(output)
            .interval(Duration::from_secs(5))
            .build()
            .unwrap();
        aggregator.add_row_item("login");
        let handle = aggregator.start();
        let submitter = handle.submitter();

        submitter.submit_async(obs("login", 12, 0)).await.unwrap();
        submitter.submit_async(obs("login", 8, 0)).await.unwrap();

        let report = rx.recv().await.unwrap();
        assert_eq!(report.interval_secs, 5);
        let row = report.operation("login").unwrap();
        assert_eq!(row.count, 2);
        assert_eq!(row.max_delay_ms, 12);
        assert_eq!(report.header_total("MsgIn"), Some(2));

        let state = handle.inspect().await.unwrap();
        assert!(state.is_empty());
        assert_eq!(handle.last_report(), Some(report));

        // The next interval starts from zero.
        submitter.submit_async(obs("login", 3, 0)).await.unwrap();
        let report = rx.recv().await.unwrap();
        assert_eq!(report.operation("login").unwrap().count, 1);

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_interval_still_reports() {
        let (output, mut rx) = Output::channel(4);
        let handle = Aggregator::builder()
            .output(output)
            .interval(Duration::from_secs(1))
            .build()
            .unwrap()
            .start();

        let report = rx.recv().await.unwrap();
        assert!(report.operations.is_empty());
        assert_eq!(report.header_total("MsgIn"), Some(0));
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn flush_now_returns_report_and_resets() {
        let mut aggregator = Aggregator::builder().build().unwrap();
        aggregator.add_row_item("query");
        aggregator.register_error_row("query");
        let handle = aggregator.start();
        let submitter = handle.submitter();

        submitter.submit_async(obs("query", 5, 404)).await.unwrap();
        submitter.submit_async(obs("query", 7, 0)).await.unwrap();

        let report = handle.flush_now().await.unwrap();
        assert_eq!(report.operation("query").unwrap().count, 2);
        let errors = report.row_error("query").unwrap();
        assert_eq!(errors.total, 1);
        assert!(handle.inspect().await.unwrap().is_empty());

        // Registration survives the flush.
        submitter.submit_async(obs("query", 1, 500)).await.unwrap();
        let state = handle.inspect().await.unwrap();
        assert_eq!(state.row_codes("query").unwrap().get(&500), Some(&1));

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn raw_counter_samples() {
        let handle = Aggregator::builder().build().unwrap().start();
        let submitter = handle.submitter();

        submitter
            .send(Sample::Add {
                key: "bytes".into(),
                value: 10,
            })
            .await
            .unwrap();
        submitter
            .send(Sample::Add {
                key: "bytes".into(),
                value: 5,
            })
            .await
            .unwrap();
        submitter
            .send(Sample::Set {
                key: "gauge".into(),
                value: 42,
            })
            .await
            .unwrap();
        submitter
            .send(Sample::Cell {
                row: "login".into(),
                column: "ok".into(),
                value: 3,
            })
            .await
            .unwrap();

        // Shutdown discards queued samples, so wait until they are applied.
        let state = handle.inspect().await.unwrap();
        assert_eq!(state.get_stat("bytes"), 15);
        assert_eq!(state.get_stat("gauge"), 42);
        assert_eq!(state.get_cell("login", "ok"), 3);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn clear_all_keeps_registrations() {
        let mut aggregator = Aggregator::builder().build().unwrap();
        aggregator.register_error_row("login");
        let handle = aggregator.start();
        let submitter = handle.submitter();

        submitter.submit_async(obs("login", 1, 404)).await.unwrap();
        handle.clear_all().await.unwrap();

        let state = handle.inspect().await.unwrap();
        assert!(state.is_empty());
        assert!(state.is_error_row("login"));
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn submit_after_stop_is_closed() {
        let handle = Aggregator::builder().build().unwrap().start();
        let submitter = handle.submitter();

        submitter.submit_async(obs("x", 1, 0)).await.unwrap();
        // Make sure the sample was applied before stopping.
        assert_eq!(handle.inspect().await.unwrap().get_stat("x"), 1);

        let state = handle.stop().await.unwrap();
        assert_eq!(state.get_stat("x"), 1);

        let result = submitter.submit_async(obs("x", 1, 0)).await;
        assert!(matches!(result, Err(Error::Closed)));
        assert!(submitter.is_closed());
    }

    #[tokio::test]
    async fn full_queue_blocks_until_started() {
        let aggregator = Aggregator::builder().queue_capacity(2).build().unwrap();
        let submitter = aggregator.submitter();

        submitter.submit_async(obs("x", 1, 0)).await.unwrap();
        submitter.submit_async(obs("x", 1, 0)).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(20),
            submitter.submit_async(obs("x", 1, 0)),
        )
        .await;
        assert!(blocked.is_err(), "third submit should wait for space");

        let pending = tokio::spawn({
            let submitter = submitter.clone();
            async move { submitter.submit_async(obs("x", 1, 0)).await }
        });

        let handle = aggregator.start();
        pending.await.unwrap().unwrap();

        assert_eq!(handle.inspect().await.unwrap().get_stat("x"), 3);
        handle.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocking_submit_from_threads() {
        let mut aggregator = Aggregator::builder().build().unwrap();
        aggregator.add_row_item("io");
        let handle = aggregator.start();

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let submitter = handle.submitter();
                std::thread::spawn(move || {
                    for delay in 0..100 {
                        submitter.push_stat("io", delay, SRC, 1, 0).unwrap();
                    }
                })
            })
            .collect();

        tokio::task::spawn_blocking(move || {
            for producer in producers {
                producer.join().unwrap();
            }
        })
        .await
        .unwrap();

        let state = handle.inspect().await.unwrap();
        assert_eq!(state.get_stat("io"), 400);
        assert_eq!(state.time_stat("io").max_delay_ms, 99);
        assert_eq!(state.get_stat("INDEGREE_Recive(B)"), 400);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_the_task() {
        let aggregator = Aggregator::builder().build().unwrap();
        let submitter = aggregator.submitter();
        let handle = aggregator.start();
        drop(handle);

        // The task exits once it sees the closed control channel.
        for _ in 0..100 {
            if submitter.is_closed() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(submitter.is_closed());
    }
}
