//! # opstat-types
//!
//! Core types shared by the opstat engine and its consumers. Producers build
//! [`Observation`]s describing completed operations; the engine turns an
//! interval's worth of them into a [`Report`].
//!
//! ## Features
//!
//! - `serde`: JSON (or any other serde format) support for every type
//!
//! ## Example
//!
//! ```rust
//! use opstat_types::{Degree, Direction, Observation};
//! use std::net::Ipv4Addr;
//!
//! let obs = Observation::new("login", 42, Ipv4Addr::new(10, 0, 0, 7), 512, 0)
//!     .with_direction(Direction::Downstream)
//!     .with_degree(Degree::Out);
//!
//! assert!(obs.is_success());
//! assert_eq!(obs.delay.as_millis(), 42);
//! ```
//!
//! ## Schema Version
//!
//! The current report schema version is **1**. Serialized reports carry it so
//! downstream parsers can detect format changes.

mod address;
mod duration;
mod observation;
mod report;
mod version;

pub use address::*;
pub use duration::*;
pub use observation::*;
pub use report::*;
pub use version::*;

/// Current report schema version.
///
/// Increment this when making breaking changes to the report format.
pub const SCHEMA_VERSION: u32 = 1;
