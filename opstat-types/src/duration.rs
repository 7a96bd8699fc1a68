//! Delay representation.
//!
//! Delays are tracked at millisecond granularity, which is also the unit the
//! report prints and the unit the thresholds are configured in.

use core::time::Duration;

/// Duration in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Milliseconds(pub u64);

impl Milliseconds {
    /// Create from milliseconds.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Create from seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * 1000)
    }

    /// Get the value in milliseconds.
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Convert to a standard Duration.
    pub const fn to_duration(&self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl From<Duration> for Milliseconds {
    /// Sub-millisecond remainders are truncated.
    fn from(d: Duration) -> Self {
        Self(d.as_millis() as u64)
    }
}

impl From<Milliseconds> for Duration {
    fn from(m: Milliseconds) -> Self {
        Duration::from_millis(m.0)
    }
}

impl From<u64> for Milliseconds {
    fn from(millis: u64) -> Self {
        Self(millis)
    }
}
