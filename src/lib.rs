#![forbid(unsafe_code)]
//! spilljoin: a memory-bounded external sort-merge join.
//!
//! Facade over the workspace crates so tests and benches can depend on a
//! single package.

pub use spilljoin_core as core;
pub use spilljoin_io as io;
pub use spilljoin_mem as mem;
pub use spilljoin_operators as operators;

pub use spilljoin_core::config::JoinConfig;
pub use spilljoin_operators::join::{
    BandJoinChecker, EquiJoinChecker, JoinCondition, JoinStats, LeftBranch, MergeJoinChecker,
    MergeJoinOperator, RightBranch,
};
