//! Observations - one reported unit of completed work.

use std::net::Ipv4Addr;

use crate::Milliseconds;

/// Which way the traffic of an observation flowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Direction {
    /// Request received from a caller (counted as `MsgIn`).
    #[default]
    Upstream,
    /// Response or call sent onwards (counted as `MsgOut`).
    Downstream,
}

/// Traffic classification orthogonal to [`Direction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Degree {
    /// Traffic on the in-degree side of this service.
    #[default]
    In,
    /// Traffic on the out-degree side of this service.
    Out,
}

/// A completed operation, as reported by a producer.
///
/// Observations are immutable once built and are consumed exactly once by
/// the aggregator.
///
/// # Example
///
/// ```rust
/// use opstat_types::{Direction, Observation};
/// use std::net::Ipv4Addr;
///
/// let obs = Observation::new("query", 12, Ipv4Addr::LOCALHOST, 64, 404);
/// assert_eq!(obs.direction, Direction::Upstream);
/// assert!(!obs.is_success());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Observation {
    /// Operation (row) name. Must not be empty.
    pub operation: String,

    /// How long the operation took.
    pub delay: Milliseconds,

    /// Outcome code, `0` for success.
    pub code: i32,

    /// Address the request came from.
    pub source: Ipv4Addr,

    /// Payload size in bytes.
    pub payload: u64,

    #[cfg_attr(feature = "serde", serde(default))]
    pub direction: Direction,

    #[cfg_attr(feature = "serde", serde(default))]
    pub degree: Degree,
}

impl Observation {
    /// Create an upstream, in-degree observation.
    pub fn new(
        operation: impl Into<String>,
        delay_ms: u64,
        source: Ipv4Addr,
        payload: u64,
        code: i32,
    ) -> Self {
        Self {
            operation: operation.into(),
            delay: Milliseconds::from_millis(delay_ms),
            code,
            source,
            payload,
            direction: Direction::Upstream,
            degree: Degree::In,
        }
    }

    /// Set the traffic direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Set the traffic degree.
    pub fn with_degree(mut self, degree: Degree) -> Self {
        self.degree = degree;
        self
    }

    /// Whether the outcome code reports success.
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults_to_upstream_in() {
        let obs = Observation::new("op", 5, Ipv4Addr::LOCALHOST, 10, 0);
        assert_eq!(obs.direction, Direction::Upstream);
        assert_eq!(obs.degree, Degree::In);
        assert!(obs.is_success());
    }

    #[test]
    fn builders_override_flags() {
        let obs = Observation::new("op", 5, Ipv4Addr::LOCALHOST, 10, 7)
            .with_direction(Direction::Downstream)
            .with_degree(Degree::Out);
        assert_eq!(obs.direction, Direction::Downstream);
        assert_eq!(obs.degree, Degree::Out);
        assert_eq!(obs.code, 7);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn flags_default_when_missing_from_json() {
        let json = r#"{"operation":"op","delay":3,"code":0,"source":"10.0.0.1","payload":1}"#;
        let obs: Observation = serde_json::from_str(json).unwrap();
        assert_eq!(obs.direction, Direction::Upstream);
        assert_eq!(obs.degree, Degree::In);
        assert_eq!(obs.delay.as_millis(), 3);
    }
}
