//! Memory-bounded sort-merge join with left-side run-file spilling.

pub mod checker;
pub mod joiner;
pub mod locks;
pub mod operator;
pub mod run_file;
pub mod status;

pub use checker::{BandJoinChecker, EquiJoinChecker, JoinCondition, MergeJoinChecker};
pub use joiner::{JoinStats, MergeJoiner};
pub use locks::MergeJoinLocks;
pub use operator::{LeftBranch, MergeJoinOperator, RightBranch};
pub use run_file::RunFileStream;
pub use status::{Branch, BranchStatus, MergeStatus, Stage, TupleStatus};
