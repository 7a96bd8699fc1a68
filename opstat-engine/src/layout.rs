//! Report layout: which items appear in which report section.

use crate::error::{Error, Result};
use crate::state::keys;

/// Ordered item names for every report section.
///
/// The layout is assembled during setup and frozen once the aggregator
/// starts; items are only ever appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportLayout {
    pub(crate) head: Vec<String>,
    pub(crate) rows: Vec<String>,
    pub(crate) columns: Vec<String>,
    pub(crate) tail: Vec<String>,
    pub(crate) address_errors: bool,
}

impl ReportLayout {
    /// An empty layout with no items in any section.
    pub fn new() -> Self {
        Self::default()
    }

    /// The layout every aggregator starts from: message totals in the header,
    /// in-degree byte counts in the tail, and the address section enabled.
    pub fn standard() -> Self {
        let mut layout = Self::new();
        layout.add_head_item(keys::MSG_IN);
        layout.add_head_item(keys::MSG_OUT);
        layout.add_tail_item(keys::IN_DEGREE_RECEIVE);
        layout.add_tail_item(keys::IN_DEGREE_SEND);
        layout.address_errors = true;
        layout
    }

    pub fn add_head_item(&mut self, name: impl Into<String>) {
        self.head.push(name.into());
    }

    /// Add an operation row to the body matrix.
    pub fn add_row_item(&mut self, name: impl Into<String>) {
        self.rows.push(name.into());
    }

    pub fn add_column_item(&mut self, name: impl Into<String>) {
        self.columns.push(name.into());
    }

    pub fn add_tail_item(&mut self, name: impl Into<String>) {
        self.tail.push(name.into());
    }

    /// Turn the per-code source address section on or off.
    pub fn set_address_errors(&mut self, enabled: bool) {
        self.address_errors = enabled;
    }

    pub fn head(&self) -> &[String] {
        &self.head
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn tail(&self) -> &[String] {
        &self.tail
    }

    pub fn address_errors(&self) -> bool {
        self.address_errors
    }

    /// Reject body columns whose keys would collide with the delay counters.
    pub fn validate(&self) -> Result<()> {
        match self.columns.iter().find(|c| keys::is_reserved(c)) {
            Some(column) => Err(Error::Config(format!(
                "column name is reserved for delay counters: {column}"
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_layout_has_message_and_degree_items() {
        let layout = ReportLayout::standard();
        assert_eq!(layout.head(), ["MsgIn", "MsgOut"]);
        assert_eq!(layout.tail(), ["INDEGREE_Recive(B)", "INDEGREE_Send(B)"]);
        assert!(layout.rows().is_empty());
        assert!(layout.address_errors());
    }

    #[test]
    fn items_keep_insertion_order() {
        let mut layout = ReportLayout::new();
        layout.add_row_item("b");
        layout.add_row_item("a");
        layout.add_column_item("ok");
        layout.add_column_item("fail");
        assert_eq!(layout.rows(), ["b", "a"]);
        assert_eq!(layout.columns(), ["ok", "fail"]);
        assert!(!layout.address_errors());
    }

    #[test]
    fn reserved_columns_are_rejected() {
        let mut layout = ReportLayout::standard();
        layout.add_column_item("ok");
        assert!(layout.validate().is_ok());

        for reserved in ["tcount", "de_max_ms", "de_up_2", "max_ip"] {
            let mut bad = layout.clone();
            bad.add_column_item(reserved);
            assert!(matches!(bad.validate(), Err(Error::Config(_))), "{reserved}");
        }
    }
}
