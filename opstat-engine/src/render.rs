//! Turning live counters into a [`Report`], and a report into text lines.

use std::fmt::Write as _;

use opstat_types::{
    decode_addr, AddressCount, AddressErrorRow, CodeCount, ErrorRow, HeaderItem, OperationRow,
    Report, SchemaVersion, TailItem,
};

use crate::layout::ReportLayout;
use crate::state::StatState;
use crate::topn::top_n;

/// Codes listed per row in the error section.
pub const ERROR_SLOTS: usize = 5;
/// Addresses listed per code in the address section.
pub const ADDRESS_SLOTS: usize = 3;

const BANNER: &str = "---------------------";
const SEP: &str = " | ";

/// Build the structured report from the live state.
///
/// Reads the state in place; the caller resets it afterwards within the
/// same step so nothing can observe a half-cleared interval.
pub fn build_report(
    state: &StatState,
    layout: &ReportLayout,
    interval_secs: u64,
    timestamp_ms: u64,
) -> Report {
    let thresholds = state.thresholds();
    let per_second_divisor = interval_secs.max(1);

    let header = layout
        .head()
        .iter()
        .map(|name| {
            let total = state.get_stat(name);
            HeaderItem {
                name: name.clone(),
                total,
                per_second: total / per_second_divisor,
            }
        })
        .collect();

    let operations = layout
        .rows()
        .iter()
        .filter_map(|name| {
            let cells: Vec<u64> = layout
                .columns()
                .iter()
                .map(|column| state.get_cell(name, column))
                .collect();
            let stat = state.time_stat(name);
            if stat.count == 0 && cells.iter().all(|&v| v == 0) {
                return None;
            }
            Some(OperationRow {
                name: name.clone(),
                cells,
                count: stat.count,
                mean_delay_ms: stat.mean_delay_ms,
                max_delay_ms: stat.max_delay_ms,
                max_delay_source: stat.max_delay_source,
                over_thresholds: stat.over,
                timeouts: state.timeouts(name),
            })
        })
        .collect();

    let mut row_names: Vec<&String> = state
        .row_errors()
        .iter()
        .filter(|(_, codes)| !codes.is_empty())
        .map(|(name, _)| name)
        .collect();
    row_names.sort();

    let row_errors: Vec<ErrorRow> = row_names
        .into_iter()
        .filter_map(|name| {
            let top = code_counts(top_n(state.row_codes(name)?, ERROR_SLOTS));
            // Only the listed codes count toward the row total.
            let total = top
                .iter()
                .fold(0u64, |acc, entry| acc.saturating_add(entry.count));
            Some(ErrorRow {
                name: name.clone(),
                top,
                total,
            })
        })
        .collect();

    let error_totals = ErrorRow {
        name: "TOTAL".to_string(),
        top: code_counts(top_n(state.code_totals(), ERROR_SLOTS)),
        total: row_errors
            .iter()
            .fold(0u64, |acc, row| acc.saturating_add(row.total)),
    };

    let address_errors = layout.address_errors().then(|| {
        let mut codes: Vec<(&i32, &std::collections::HashMap<u32, u64>)> = state
            .address_errors()
            .iter()
            .filter(|(_, sources)| !sources.is_empty())
            .collect();
        codes.sort_by_key(|(code, _)| **code);
        codes
            .into_iter()
            .map(|(&code, sources)| AddressErrorRow {
                code,
                top: top_n(sources, ADDRESS_SLOTS)
                    .into_iter()
                    .map(|(bits, count)| AddressCount {
                        source: decode_addr(bits),
                        count,
                    })
                    .collect(),
            })
            .collect::<Vec<_>>()
    });

    let tail = layout
        .tail()
        .iter()
        .map(|name| TailItem {
            name: name.clone(),
            value: state.get_stat(name),
        })
        .collect();

    Report {
        version: SchemaVersion::current(),
        timestamp_ms,
        interval_secs,
        header,
        columns: layout.columns().to_vec(),
        delay_thresholds: thresholds.delay_up,
        timeout_ms: thresholds.timeout_ms,
        operations,
        row_errors,
        error_totals,
        address_errors,
        tail,
    }
}

fn code_counts(ranked: Vec<(i32, u64)>) -> Vec<CodeCount> {
    ranked
        .into_iter()
        .map(|(code, count)| CodeCount { code, count })
        .collect()
}

/// Render a report as log lines, one section after another.
///
/// Sections always appear in the order header, operations, row errors,
/// address errors (when enabled), tail. Unused top-N slots are padded
/// with `0/0`.
pub fn render_lines(report: &Report) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push(format!(
        "Statistic in {}s,  CTime: {}",
        report.interval_secs,
        format_timestamp(report.timestamp_ms)
    ));

    push_banner(&mut lines, "Head Information");
    let mut names = format!("{:18}", "");
    let mut totals = format!("{:<18}", "total:");
    let mut rates = format!("{:<18}", "count /1s:");
    for item in &report.header {
        let _ = write!(names, "|{:>9}", item.name);
        let _ = write!(totals, "|{:>9}", item.total);
        let _ = write!(rates, "|{:>9}", item.per_second);
    }
    lines.extend([names, totals, rates]);

    push_banner(&mut lines, "Operation Information");
    let mut heading = format!("{:<18}", "Op");
    for column in &report.columns {
        let _ = write!(heading, "|{:>8} ", column);
    }
    let [up1, up2, up3] = report.delay_thresholds;
    let _ = write!(
        heading,
        "|{:>8}|{:>9}|{:>9}|{:>15}|>{:>3}(ms)|>{:>3}(ms)|>{:>3}(ms)|{:>4}(ms)|",
        "tcount", "avg_de_ms", "de_max_ms", "max_ip", up1, up2, up3, report.timeout_ms
    );
    lines.push(heading);
    for row in &report.operations {
        let mut line = format!("{:<18}", format!("{}:", row.name));
        for cell in &row.cells {
            let _ = write!(line, "|{:>8} ", cell);
        }
        let [o1, o2, o3] = row.over_thresholds;
        let _ = write!(
            line,
            "|{:>8}|{:>9.3}|{:>9}|{:>15}|{:>8}|{:>8}|{:>8}|{:>8}|",
            row.count,
            row.mean_delay_ms,
            row.max_delay_ms,
            row.max_delay_source.to_string(),
            o1,
            o2,
            o3,
            row.timeouts
        );
        lines.push(line);
    }

    push_banner(&mut lines, "Error Information");
    let mut heading = format!("{:<17}", "Op");
    for slot in 1..=ERROR_SLOTS {
        let _ = write!(heading, "{SEP}{:<11}", format!("Err{slot}"));
    }
    let _ = write!(heading, "{SEP}{:<11}", "total count");
    lines.push(heading);
    for row in &report.row_errors {
        lines.push(error_line(&format!("{}_E", row.name), row));
    }
    lines.push(BANNER.to_string());
    lines.push(error_line("TOTAL", &report.error_totals));

    if let Some(address_rows) = &report.address_errors {
        push_banner(&mut lines, "IP Information");
        let mut heading = format!("{:<17}", "retcode");
        for slot in 1..=ADDRESS_SLOTS {
            let _ = write!(heading, "{SEP}{:<17}", format!("ip{slot}"));
        }
        lines.push(heading);
        for row in address_rows {
            let mut line = format!("{:<17}", row.code);
            for entry in &row.top {
                let _ = write!(line, "{SEP}{:<17}", format!("{}/{}", entry.source, entry.count));
            }
            for _ in row.top.len()..ADDRESS_SLOTS {
                let _ = write!(line, "{SEP}{:<17}", "0/0");
            }
            lines.push(line);
        }
    }

    if !report.tail.is_empty() {
        push_banner(&mut lines, "Tail Information");
        for item in &report.tail {
            lines.push(format!("{:<17} | {:>8}", format!("{}#", item.name), item.value));
        }
    }

    lines.push(String::new());
    lines
}

/// Render a report as a single block of text.
pub fn render_text(report: &Report) -> String {
    let mut text = render_lines(report).join("\n");
    text.push('\n');
    text
}

fn error_line(label: &str, row: &ErrorRow) -> String {
    let mut line = format!("{:<17}", label);
    for entry in &row.top {
        let _ = write!(line, "{SEP}{:<11}", format!("{}/{}", entry.code, entry.count));
    }
    for _ in row.top.len()..ERROR_SLOTS {
        let _ = write!(line, "{SEP}{:<11}", "0/0");
    }
    let _ = write!(line, "{SEP}{:<11}", row.total);
    line
}

fn push_banner(lines: &mut Vec<String>, title: &str) {
    lines.push(BANNER.to_string());
    lines.push(title.to_string());
    lines.push(BANNER.to_string());
}

fn format_timestamp(timestamp_ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms as i64)
        .map(|utc| {
            utc.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| timestamp_ms.to_string())
}
