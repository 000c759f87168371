//! Handoff between the two producer threads of a merge join.
//!
//! A single token says which branch may run. The left driver owns the join
//! state; when it needs another right frame it hands the token to the right
//! producer and waits. A right push blocks until it holds the token, drops
//! its frame into a one-frame slot and hands the token back.

use std::sync::{Condvar, Mutex, MutexGuard};

use spilljoin_core::frame::Frame;

use super::status::Branch;
use crate::traits::OpError;

#[derive(Debug)]
struct Handoff {
    active: Branch,
    slot: Option<Frame>,
    right_closed: bool,
    left_closed: bool,
    aborted: bool,
    frames_handed: u64,
}

#[derive(Debug)]
pub struct MergeJoinLocks {
    state: Mutex<Handoff>,
    left_cv: Condvar,
    right_cv: Condvar,
}

impl Default for MergeJoinLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeJoinLocks {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Handoff {
                active: Branch::Left,
                slot: None,
                right_closed: false,
                left_closed: false,
                aborted: false,
                frames_handed: 0,
            }),
            left_cv: Condvar::new(),
            right_cv: Condvar::new(),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, Handoff>, OpError> {
        self.state
            .lock()
            .map_err(|e| OpError::Exec(format!("merge join lock poisoned: {e}")))
    }

    /// Block the left driver until the right producer delivers a frame.
    ///
    /// `Ok(None)` once the right branch has closed and the slot is drained.
    pub fn request_right_frame(&self) -> Result<Option<Frame>, OpError> {
        let mut st = self.state()?;
        loop {
            if st.aborted {
                return Err(OpError::Aborted);
            }
            if let Some(frame) = st.slot.take() {
                st.active = Branch::Left;
                return Ok(Some(frame));
            }
            if st.right_closed {
                st.active = Branch::Left;
                return Ok(None);
            }
            st.active = Branch::Right;
            self.right_cv.notify_all();
            st = self
                .left_cv
                .wait(st)
                .map_err(|e| OpError::Exec(format!("condition variable wait failed: {e}")))?;
        }
    }

    /// Hand a right frame to the left driver, waiting until it asks for one.
    ///
    /// Returns immediately once the left branch has closed.
    pub fn push_right_frame(&self, frame: Frame) -> Result<(), OpError> {
        let mut st = self.state()?;
        loop {
            if st.aborted {
                return Err(OpError::Aborted);
            }
            if st.left_closed {
                return Ok(());
            }
            if st.active == Branch::Right && st.slot.is_none() {
                st.slot = Some(frame);
                st.frames_handed += 1;
                st.active = Branch::Left;
                self.left_cv.notify_all();
                return Ok(());
            }
            st = self
                .right_cv
                .wait(st)
                .map_err(|e| OpError::Exec(format!("condition variable wait failed: {e}")))?;
        }
    }

    pub fn close_right(&self) -> Result<(), OpError> {
        let mut st = self.state()?;
        st.right_closed = true;
        self.left_cv.notify_all();
        Ok(())
    }

    pub fn close_left(&self) -> Result<(), OpError> {
        let mut st = self.state()?;
        st.left_closed = true;
        st.slot = None;
        self.right_cv.notify_all();
        Ok(())
    }

    /// Wake every waiter with `OpError::Aborted`. Works on a poisoned lock.
    pub fn abort(&self) {
        let mut st = match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        st.aborted = true;
        st.slot = None;
        self.left_cv.notify_all();
        self.right_cv.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.state().map(|s| s.aborted).unwrap_or(true)
    }

    pub fn frames_handed(&self) -> u64 {
        self.state().map(|s| s.frames_handed).unwrap_or(0)
    }
}
