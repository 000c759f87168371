//! The two input ports of a merge join.
//!
//! `MergeJoinOperator::new` wires one engine to a pair of handles. Each
//! handle can move to its own producer thread. The left handle drives the
//! engine and writes results; the right handle only hands frames over.

use std::sync::Arc;

use spilljoin_core::config::JoinConfig;
use spilljoin_core::frame::Frame;
use spilljoin_core::schema::Schema;
use spilljoin_mem::Storage;

use super::checker::MergeJoinChecker;
use super::joiner::{JoinStats, MergeJoiner};
use super::locks::MergeJoinLocks;
use crate::traits::{FrameWriter, OpError};

pub struct MergeJoinOperator;

impl MergeJoinOperator {
    /// Build the engine and return its `(left, right)` ports.
    ///
    /// Fails with `OpError::Config` when the memory budget is below one frame.
    #[allow(clippy::new_ret_no_self)]
    pub fn new<C: MergeJoinChecker>(
        config: &JoinConfig,
        checker: C,
        left_format: Schema,
        right_format: Schema,
        storage: Arc<dyn Storage>,
    ) -> Result<(LeftBranch<C>, RightBranch), OpError> {
        let locks = Arc::new(MergeJoinLocks::new());
        let joiner = MergeJoiner::new(
            config,
            checker,
            left_format,
            right_format,
            locks.clone(),
            storage,
        )?;
        Ok((
            LeftBranch {
                joiner,
                locks: locks.clone(),
                done: false,
            },
            RightBranch {
                locks,
                frames_pushed: 0,
                done: false,
            },
        ))
    }
}

pub struct LeftBranch<C: MergeJoinChecker> {
    joiner: MergeJoiner<C>,
    locks: Arc<MergeJoinLocks>,
    done: bool,
}

impl<C: MergeJoinChecker> LeftBranch<C> {
    pub fn result_format(&self) -> &Schema {
        self.joiner.result_format()
    }

    pub fn stats(&self) -> JoinStats {
        self.joiner.stats()
    }

    /// Push one left frame and join it as far as the right side allows.
    ///
    /// Any error aborts the join.
    pub fn next_frame<W: FrameWriter + ?Sized>(
        &mut self,
        frame: Frame,
        writer: &mut W,
    ) -> Result<(), OpError> {
        if self.done || self.locks.is_aborted() {
            return Err(OpError::Aborted);
        }
        self.joiner.set_left_frame(frame);
        if let Err(e) = self.joiner.process_merge_using_left_tuple(writer) {
            self.fail();
            return Err(e);
        }
        Ok(())
    }

    /// Finish the join, flush the last result frame and release the right side.
    pub fn close<W: FrameWriter + ?Sized>(mut self, writer: &mut W) -> Result<JoinStats, OpError> {
        if self.done || self.locks.is_aborted() {
            return Err(OpError::Aborted);
        }
        if let Err(e) = self.joiner.process_left_close(writer) {
            self.fail();
            return Err(e);
        }
        self.done = true;
        self.locks.close_left()?;
        Ok(self.joiner.stats())
    }

    /// Abort the join from the left side.
    pub fn fail(&mut self) {
        if !self.done {
            self.done = true;
            self.joiner.abort();
        }
    }
}

impl<C: MergeJoinChecker> Drop for LeftBranch<C> {
    fn drop(&mut self) {
        if !self.done {
            tracing::warn!("left branch dropped before close; aborting join");
            self.fail();
        }
    }
}

pub struct RightBranch {
    locks: Arc<MergeJoinLocks>,
    frames_pushed: u64,
    done: bool,
}

impl RightBranch {
    /// Hand one right frame to the join, blocking until the left side takes it.
    pub fn next_frame(&mut self, frame: Frame) -> Result<(), OpError> {
        if self.done {
            return Err(OpError::Exec("right branch already closed".into()));
        }
        self.frames_pushed += 1;
        self.locks.push_right_frame(frame)
    }

    pub fn close(mut self) -> Result<(), OpError> {
        self.done = true;
        self.locks.close_right()
    }

    /// Abort the join from the right side.
    pub fn fail(&mut self) {
        self.done = true;
        self.locks.abort();
    }

    pub fn frames_pushed(&self) -> u64 {
        self.frames_pushed
    }
}

impl Drop for RightBranch {
    fn drop(&mut self) {
        if !self.done {
            tracing::warn!("right branch dropped before close; aborting join");
            self.fail();
        }
    }
}
