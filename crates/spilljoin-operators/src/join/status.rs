//! Per-branch and merge-wide status flags.
//!
//! Only the thread driving the left branch mutates these; the right branch
//! talks to it through `MergeJoinLocks`.

use std::fmt;
use std::ops::{Index, IndexMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Left,
    Right,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Branch::Left => "left",
            Branch::Right => "right",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Open,
    DataProcessing,
    Closed,
}

/// Result of trying to position a branch cursor on a tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TupleStatus {
    /// No tuple in hand, but the branch may still deliver one.
    Unknown,
    Loaded,
    /// The branch is exhausted.
    Empty,
}

impl TupleStatus {
    pub fn is_loaded(self) -> bool {
        self == TupleStatus::Loaded
    }

    pub fn is_empty(self) -> bool {
        self == TupleStatus::Empty
    }

    pub fn is_known(self) -> bool {
        self != TupleStatus::Unknown
    }
}

/// `run_file_writing` and `run_file_reading` are never both set.
#[derive(Debug, Clone)]
pub struct BranchStatus {
    has_more: bool,
    run_file_writing: bool,
    run_file_reading: bool,
    stage: Stage,
}

impl Default for BranchStatus {
    fn default() -> Self {
        Self {
            has_more: true,
            run_file_writing: false,
            run_file_reading: false,
            stage: Stage::Open,
        }
    }
}

impl BranchStatus {
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn no_more(&mut self) {
        self.has_more = false;
    }

    pub fn is_run_file_writing(&self) -> bool {
        self.run_file_writing
    }

    pub fn is_run_file_reading(&self) -> bool {
        self.run_file_reading
    }

    /// Entering the writer epoch ends any reader epoch.
    pub fn set_run_file_writing(&mut self, on: bool) {
        self.run_file_writing = on;
        if on {
            self.run_file_reading = false;
        }
    }

    /// Entering the reader epoch ends any writer epoch.
    pub fn set_run_file_reading(&mut self, on: bool) {
        self.run_file_reading = on;
        if on {
            self.run_file_writing = false;
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeStatus {
    branch: [BranchStatus; 2],
}

impl MergeStatus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Index<Branch> for MergeStatus {
    type Output = BranchStatus;

    fn index(&self, b: Branch) -> &BranchStatus {
        &self.branch[b as usize]
    }
}

impl IndexMut<Branch> for MergeStatus {
    fn index_mut(&mut self, b: Branch) -> &mut BranchStatus {
        &mut self.branch[b as usize]
    }
}
