//! Report - the structured result of one flush interval.

use std::net::Ipv4Addr;

use crate::SchemaVersion;

/// Everything rendered for one flush interval, section by section.
///
/// The section order (header, operations, row errors, address errors,
/// tail) is part of the output contract; the text renderer writes them in
/// exactly that order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Report {
    /// Schema version for forward compatibility.
    pub version: SchemaVersion,

    /// Unix timestamp in milliseconds when the report was taken.
    pub timestamp_ms: u64,

    /// Length of the flush interval the counters cover.
    pub interval_secs: u64,

    pub header: Vec<HeaderItem>,

    /// Column names of the operation matrix, in layout order.
    pub columns: Vec<String>,

    /// The three delay bucket thresholds in milliseconds.
    pub delay_thresholds: [u64; 3],

    /// The timeout threshold in milliseconds.
    pub timeout_ms: u64,

    pub operations: Vec<OperationRow>,

    /// Per-operation error breakdowns for registered error rows.
    pub row_errors: Vec<ErrorRow>,

    /// Top codes across all operations.
    pub error_totals: ErrorRow,

    /// Per-code source address breakdown, `None` when the section is disabled.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub address_errors: Option<Vec<AddressErrorRow>>,

    pub tail: Vec<TailItem>,
}

impl Report {
    /// Look up an operation row by name.
    pub fn operation(&self, name: &str) -> Option<&OperationRow> {
        self.operations.iter().find(|row| row.name == name)
    }

    /// Look up a row error breakdown by operation name.
    pub fn row_error(&self, name: &str) -> Option<&ErrorRow> {
        self.row_errors.iter().find(|row| row.name == name)
    }

    /// Total of a header item, if the item is part of the layout.
    pub fn header_total(&self, name: &str) -> Option<u64> {
        self.header
            .iter()
            .find(|item| item.name == name)
            .map(|item| item.total)
    }

    /// Value of a tail item, if the item is part of the layout.
    pub fn tail_value(&self, name: &str) -> Option<u64> {
        self.tail
            .iter()
            .find(|item| item.name == name)
            .map(|item| item.value)
    }

    /// True when no operation recorded anything during the interval.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.row_errors.is_empty()
    }
}

/// One entry of the header section.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeaderItem {
    pub name: String,
    pub total: u64,
    /// `total` divided by the interval length in seconds.
    pub per_second: u64,
}

/// One operation row of the body matrix.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OperationRow {
    pub name: String,

    /// Cell values, one per report column.
    pub cells: Vec<u64>,

    /// Observations counted for the delay statistics.
    pub count: u64,

    pub mean_delay_ms: f64,

    pub max_delay_ms: u64,

    /// Source of the first observation that reached `max_delay_ms`.
    pub max_delay_source: Ipv4Addr,

    /// Observations above each of the three delay thresholds.
    pub over_thresholds: [u64; 3],

    /// Observations above the timeout threshold.
    pub timeouts: u64,
}

/// An outcome code together with how often it occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CodeCount {
    pub code: i32,
    pub count: u64,
}

/// Top error codes for one operation (or for all of them).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorRow {
    pub name: String,
    /// Highest-count codes, count descending then code ascending.
    pub top: Vec<CodeCount>,
    pub total: u64,
}

/// A source address together with how often it produced a given code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AddressCount {
    pub source: Ipv4Addr,
    pub count: u64,
}

/// Top source addresses for one error code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AddressErrorRow {
    pub code: i32,
    pub top: Vec<AddressCount>,
}

/// One entry of the tail section.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TailItem {
    pub name: String,
    pub value: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Report {
        Report {
            version: SchemaVersion::current(),
            timestamp_ms: 1_703_160_000_000,
            interval_secs: 60,
            header: vec![HeaderItem {
                name: "MsgIn".to_string(),
                total: 120,
                per_second: 2,
            }],
            columns: Vec::new(),
            delay_thresholds: [100, 500, 1000],
            timeout_ms: 3000,
            operations: vec![OperationRow {
                name: "login".to_string(),
                cells: Vec::new(),
                count: 120,
                mean_delay_ms: 12.5,
                max_delay_ms: 900,
                max_delay_source: Ipv4Addr::new(10, 0, 0, 1),
                over_thresholds: [3, 1, 0],
                timeouts: 0,
            }],
            row_errors: Vec::new(),
            error_totals: ErrorRow {
                name: "TOTAL".to_string(),
                ..Default::default()
            },
            address_errors: None,
            tail: vec![TailItem {
                name: "INDEGREE_Recive(B)".to_string(),
                value: 4096,
            }],
        }
    }

    #[test]
    fn lookups_by_name() {
        let report = sample();
        assert_eq!(report.operation("login").unwrap().count, 120);
        assert!(report.operation("logout").is_none());
        assert_eq!(report.header_total("MsgIn"), Some(120));
        assert_eq!(report.tail_value("INDEGREE_Recive(B)"), Some(4096));
        assert!(!report.is_empty());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_roundtrip() {
        let report = sample();
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("address_errors"));
        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(report, parsed);
    }
}
