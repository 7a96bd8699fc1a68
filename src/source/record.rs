//! Newline-delimited JSON observation records.

use std::net::Ipv4Addr;

use anyhow::{bail, Context, Result};
use opstat_types::{Degree, Direction, Observation};
use serde::Deserialize;

/// One observation as it appears on the wire.
///
/// ```json
/// {"op": "login", "delay_ms": 12, "source": "10.0.0.1", "payload": 512, "code": 0}
/// ```
///
/// `payload`, `code`, `direction` and `degree` may be omitted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObservationRecord {
    pub op: String,
    pub delay_ms: u64,
    pub source: String,
    #[serde(default)]
    pub payload: u64,
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub degree: Degree,
}

impl TryFrom<ObservationRecord> for Observation {
    type Error = anyhow::Error;

    fn try_from(record: ObservationRecord) -> Result<Self> {
        if record.op.is_empty() {
            bail!("Record has an empty \"op\"");
        }
        let source: Ipv4Addr = record
            .source
            .trim()
            .parse()
            .with_context(|| format!("Invalid source address: {:?}", record.source))?;

        Ok(Observation::new(
            record.op,
            record.delay_ms,
            source,
            record.payload,
            record.code,
        )
        .with_direction(record.direction)
        .with_degree(record.degree))
    }
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<Observation>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let record: ObservationRecord = serde_json::from_str(line).context("Parse error")?;
    Observation::try_from(record).map(Some)
}
