//! Fixed-size frame pool built on top of the hard MemoryBudget.
//!
//! Frames are checked out one at a time; each carries the guard for its bytes,
//! so returning a frame is just dropping it. The pool is deallocatable: a
//! frame can go back at any moment, not only on a full reset.
//!
//! Pooled frames are slotted: a tuple keeps its slot index for as long as it
//! lives, and deleting it frees both the slot and its bytes for reuse.

use spilljoin_core::budget::{BudgetGuard, MemoryBudget};
use spilljoin_core::types::Tuple;

use crate::error::{Error, Result};
use crate::guard::{BudgetGuardImpl, MemoryBudgetImpl};

/// A slotted frame whose bytes are accounted against the pool's budget until dropped.
pub struct PooledFrame {
    guard: BudgetGuardImpl,
    capacity: usize,
    used: usize,
    live: usize,
    slots: Vec<Option<Tuple>>,
    free_slots: Vec<usize>,
}

impl PooledFrame {
    fn new(guard: BudgetGuardImpl, capacity: usize) -> Self {
        Self {
            guard,
            capacity,
            used: 0,
            live: 0,
            slots: Vec::new(),
            free_slots: Vec::new(),
        }
    }

    /// Current accounted size (bytes).
    pub fn accounted_bytes(&self) -> usize {
        self.guard.bytes()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used_bytes(&self) -> usize {
        self.used
    }

    pub fn live_tuples(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn fits(&self, bytes: usize) -> bool {
        self.used + bytes <= self.capacity
    }

    /// Store `tuple` and return its slot, or `None` if the bytes do not fit.
    pub fn insert(&mut self, tuple: &Tuple) -> Option<usize> {
        let bytes = tuple.encoded_len();
        if !self.fits(bytes) {
            return None;
        }
        self.used += bytes;
        self.live += 1;
        match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot] = Some(tuple.clone());
                Some(slot)
            }
            None => {
                self.slots.push(Some(tuple.clone()));
                Some(self.slots.len() - 1)
            }
        }
    }

    pub fn get(&self, slot: usize) -> Option<&Tuple> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Remove the tuple in `slot`, freeing its bytes and the slot.
    pub fn remove(&mut self, slot: usize) -> Option<Tuple> {
        let tuple = self.slots.get_mut(slot)?.take()?;
        self.used -= tuple.encoded_len();
        self.live -= 1;
        self.free_slots.push(slot);
        Some(tuple)
    }
}

/// Pool of equal-size frames drawn from a byte budget.
pub struct FramePool<B: MemoryBudget = MemoryBudgetImpl> {
    budget: B,
    frame_size: usize,
}

impl FramePool<MemoryBudgetImpl> {
    /// Pool holding at most `frames` frames of `frame_size` bytes.
    pub fn with_frames(frames: usize, frame_size: usize) -> Result<Self> {
        if frames < 1 {
            return Err(Error::Config(format!(
                "frame pool needs at least 1 frame, got {}",
                frames
            )));
        }
        Self::new(MemoryBudgetImpl::for_frames(frames, frame_size), frame_size)
    }
}

impl<B: MemoryBudget<Guard = BudgetGuardImpl>> FramePool<B> {
    pub fn new(budget: B, frame_size: usize) -> Result<Self> {
        if frame_size == 0 {
            return Err(Error::Config("frame_size must be > 0".into()));
        }
        if budget.capacity_bytes() < frame_size {
            return Err(Error::Config(format!(
                "budget of {} bytes cannot hold one {}-byte frame",
                budget.capacity_bytes(),
                frame_size
            )));
        }
        Ok(Self { budget, frame_size })
    }

    /// Check out one frame, or `None` when the budget has no room left.
    pub fn allocate(&self) -> Option<PooledFrame> {
        let guard = self.budget.try_acquire(self.frame_size, "pool_frame")?;
        Some(PooledFrame::new(guard, self.frame_size))
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn capacity_frames(&self) -> usize {
        self.budget.capacity_bytes() / self.frame_size
    }

    pub fn frames_in_use(&self) -> usize {
        self.budget.used_bytes() / self.frame_size
    }

    pub fn budget(&self) -> &B {
        &self.budget
    }
}
