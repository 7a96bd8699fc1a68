//! Aggregation state owned by the aggregator task.
//!
//! Nothing in here is synchronized: the aggregator task is the only writer,
//! and every update rule below runs to completion before the next sample is
//! looked at.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use opstat_types::{decode_addr, encode_addr, Degree, Direction, Observation};

use crate::config::Thresholds;

/// Counter names used by the update rule.
pub mod keys {
    pub const MSG_IN: &str = "MsgIn";
    pub const MSG_OUT: &str = "MsgOut";
    pub const IN_DEGREE_RECEIVE: &str = "INDEGREE_Recive(B)";
    pub const IN_DEGREE_SEND: &str = "INDEGREE_Send(B)";
    pub const OUT_DEGREE_RECEIVE: &str = "OUTDEGREE_Recive(B)";
    pub const OUT_DEGREE_SEND: &str = "OUTDEGREE_Send(B)";

    pub const COUNT: &str = "tcount";
    pub const DELAY_TOTAL: &str = "de_total_ms";
    pub const DELAY_MAX: &str = "de_max_ms";
    pub const MAX_SOURCE: &str = "max_ip";
    pub const OVER: [&str; 3] = ["de_up", "de_up_2", "de_up_3"];

    /// Key of a per-operation counter, e.g. `login#tcount`.
    pub fn op(operation: &str, suffix: &str) -> String {
        format!("{operation}#{suffix}")
    }

    /// Suffixes written by every observation. A body column with one of
    /// these names would share keys with the delay counters.
    pub const RESERVED: [&str; 7] = [
        COUNT,
        DELAY_TOTAL,
        DELAY_MAX,
        MAX_SOURCE,
        OVER[0],
        OVER[1],
        OVER[2],
    ];

    pub fn is_reserved(column: &str) -> bool {
        RESERVED.contains(&column)
    }

    /// Key of a body matrix cell.
    ///
    /// Shares the `op#suffix` namespace, so `column` must not be reserved.
    pub fn cell(row: &str, column: &str) -> String {
        format!("{row}#{column}")
    }
}

/// Delay statistics for one operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStat {
    pub count: u64,
    pub mean_delay_ms: f64,
    pub max_delay_ms: u64,
    pub max_delay_source: Ipv4Addr,
    pub over: [u64; 3],
}

/// All counters for the current interval.
#[derive(Debug, Clone, Default)]
pub struct StatState {
    thresholds: Thresholds,
    counters: HashMap<String, u64>,
    /// Registered operations only; the inner map may be empty.
    row_errors: HashMap<String, HashMap<i32, u64>>,
    address_errors: HashMap<i32, HashMap<u32, u64>>,
    code_totals: HashMap<i32, u64>,
    timeouts: HashMap<String, u64>,
}

impl StatState {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            ..Default::default()
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub(crate) fn set_thresholds(&mut self, thresholds: Thresholds) {
        self.thresholds = thresholds;
    }

    /// Apply the update rule for one observation.
    pub fn apply(&mut self, obs: &Observation) {
        let name = obs.operation.as_str();
        let delay = obs.delay.as_millis();

        self.inc_key(&keys::op(name, keys::COUNT));
        self.inc_stat(&keys::op(name, keys::DELAY_TOTAL), delay);

        let direction_key = match obs.direction {
            Direction::Upstream => keys::MSG_IN,
            Direction::Downstream => keys::MSG_OUT,
        };
        self.inc_key(direction_key);

        let degree_key = match (obs.degree, obs.direction) {
            (Degree::In, Direction::Upstream) => keys::IN_DEGREE_RECEIVE,
            (Degree::In, Direction::Downstream) => keys::IN_DEGREE_SEND,
            (Degree::Out, Direction::Upstream) => keys::OUT_DEGREE_RECEIVE,
            (Degree::Out, Direction::Downstream) => keys::OUT_DEGREE_SEND,
        };
        self.inc_stat(degree_key, obs.payload);

        // Strictly greater: the first observation to reach a maximum keeps it.
        let max_key = keys::op(name, keys::DELAY_MAX);
        if delay > self.get_stat(&max_key) {
            self.set_stat(&max_key, delay);
            self.set_stat(
                &keys::op(name, keys::MAX_SOURCE),
                u64::from(encode_addr(obs.source)),
            );
        }

        for (threshold, suffix) in self.thresholds.delay_up.into_iter().zip(keys::OVER) {
            if delay > threshold {
                self.inc_key(&keys::op(name, suffix));
            }
        }

        self.inc_key(name);

        if obs.code != 0 {
            self.inc_address_code(obs.source, obs.code, 1);
            self.inc_row_code(name, obs.code, 1);
        }

        if delay > self.thresholds.timeout_ms {
            self.inc_timeout(name);
        }
    }

    /// Add `value` to a counter, creating it if needed.
    pub fn inc_stat(&mut self, key: &str, value: u64) {
        match self.counters.get_mut(key) {
            Some(count) => *count = count.saturating_add(value),
            None => {
                self.counters.insert(key.to_string(), value);
            }
        }
    }

    /// Add one to a counter.
    pub fn inc_key(&mut self, key: &str) {
        self.inc_stat(key, 1);
    }

    /// Overwrite a counter.
    pub fn set_stat(&mut self, key: &str, value: u64) {
        self.counters.insert(key.to_string(), value);
    }

    /// Current value of a counter; missing counters read as zero.
    pub fn get_stat(&self, key: &str) -> u64 {
        self.counters.get(key).copied().unwrap_or(0)
    }

    /// Add `value` to the body matrix cell at `row`/`column`.
    pub fn inc_cell(&mut self, row: &str, column: &str, value: u64) {
        self.inc_stat(&keys::cell(row, column), value);
    }

    pub fn get_cell(&self, row: &str, column: &str) -> u64 {
        self.get_stat(&keys::cell(row, column))
    }

    /// Add to the global total of an outcome code.
    pub fn inc_code(&mut self, code: i32, value: u64) {
        let count = self.code_totals.entry(code).or_insert(0);
        *count = count.saturating_add(value);
    }

    /// Count an error code against an operation.
    ///
    /// The global total always moves; the per-operation breakdown only moves
    /// when the operation was registered as an error row.
    pub fn inc_row_code(&mut self, operation: &str, code: i32, value: u64) {
        self.inc_code(code, value);
        if let Some(codes) = self.row_errors.get_mut(operation) {
            let count = codes.entry(code).or_insert(0);
            *count = count.saturating_add(value);
        }
    }

    /// Count an error code against the address that produced it.
    pub fn inc_address_code(&mut self, source: Ipv4Addr, code: i32, value: u64) {
        let count = self
            .address_errors
            .entry(code)
            .or_default()
            .entry(encode_addr(source))
            .or_insert(0);
        *count = count.saturating_add(value);
    }

    pub fn inc_timeout(&mut self, operation: &str) {
        match self.timeouts.get_mut(operation) {
            Some(count) => *count = count.saturating_add(1),
            None => {
                self.timeouts.insert(operation.to_string(), 1);
            }
        }
    }

    pub fn timeouts(&self, operation: &str) -> u64 {
        self.timeouts.get(operation).copied().unwrap_or(0)
    }

    /// Register `operation` for the per-operation error breakdown.
    ///
    /// Re-registering discards whatever breakdown the row had.
    pub fn register_error_row(&mut self, operation: impl Into<String>) {
        self.row_errors.insert(operation.into(), HashMap::new());
    }

    pub fn is_error_row(&self, operation: &str) -> bool {
        self.row_errors.contains_key(operation)
    }

    /// Breakdown of codes for a registered operation.
    pub fn row_codes(&self, operation: &str) -> Option<&HashMap<i32, u64>> {
        self.row_errors.get(operation)
    }

    pub(crate) fn row_errors(&self) -> &HashMap<String, HashMap<i32, u64>> {
        &self.row_errors
    }

    /// Per-address breakdown of one code.
    pub fn address_codes(&self, code: i32) -> Option<&HashMap<u32, u64>> {
        self.address_errors.get(&code)
    }

    pub(crate) fn address_errors(&self) -> &HashMap<i32, HashMap<u32, u64>> {
        &self.address_errors
    }

    pub fn code_total(&self, code: i32) -> u64 {
        self.code_totals.get(&code).copied().unwrap_or(0)
    }

    pub(crate) fn code_totals(&self) -> &HashMap<i32, u64> {
        &self.code_totals
    }

    /// Delay statistics for an operation.
    ///
    /// Missing counters read as zero; each miss is logged at debug level
    /// since it usually means the operation saw no traffic this interval.
    pub fn time_stat(&self, operation: &str) -> TimeStat {
        let lookup = |suffix: &str| {
            let key = keys::op(operation, suffix);
            self.counters.get(&key).copied().unwrap_or_else(|| {
                tracing::debug!(key = %key, "no counter recorded");
                0
            })
        };

        let count = lookup(keys::COUNT);
        let total = lookup(keys::DELAY_TOTAL);
        let mean_delay_ms = if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        };

        TimeStat {
            count,
            mean_delay_ms,
            max_delay_ms: lookup(keys::DELAY_MAX),
            max_delay_source: decode_addr(
                self.get_stat(&keys::op(operation, keys::MAX_SOURCE)) as u32,
            ),
            over: keys::OVER.map(lookup),
        }
    }

    /// Clear every counter for the next interval.
    ///
    /// Error row registrations survive: their breakdowns are emptied but the
    /// rows keep collecting without being registered again.
    pub fn reset(&mut self) {
        self.timeouts.clear();
        self.counters.clear();
        self.code_totals.clear();
        for codes in self.row_errors.values_mut() {
            codes.clear();
        }
        self.address_errors.clear();
    }

    /// Administrative full clear.
    ///
    /// Clears the same structures as [`reset`](Self::reset) and, like it,
    /// keeps error row registrations.
    pub fn clear_all(&mut self) {
        self.reset();
        tracing::debug!(rows = self.row_errors.len(), "cleared all counters");
    }

    /// True when no counter of any kind holds a value.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
            && self.timeouts.is_empty()
            && self.code_totals.is_empty()
            && self.address_errors.is_empty()
            && self.row_errors.values().all(HashMap::is_empty)
    }
}
