#![forbid(unsafe_code)]
//! spilljoin-core: shared vocabulary for the join engine.
//!
//! Scalars, tuples, fixed-capacity frames and their cursor, record formats,
//! strongly-typed ids, configuration, and the memory-budget traits that
//! `spilljoin-mem` implements. No IO and no threading live here.

pub mod budget;
pub mod config;
pub mod error;
pub mod frame;
pub mod id;
pub mod prelude;
pub mod schema;
pub mod types;

/// Crate version string, logged when a joiner starts.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
