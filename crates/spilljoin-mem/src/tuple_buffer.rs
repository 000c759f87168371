//! Deletable tuple buffer: the right-side window's storage.
//!
//! Tuples live in slotted frames checked out from a `FramePool`. A
//! `TuplePointer` is an index pair into that arena plus the buffer epoch, so
//! `reset` invalidates every outstanding pointer in O(1) by bumping the epoch
//! instead of chasing them down.

use std::fmt;

use spilljoin_core::budget::MemoryBudget;
use spilljoin_core::types::Tuple;

use crate::error::{Error, Result};
use crate::pool::{FramePool, PooledFrame};
use crate::tracking::PeakTracker;

/// Handle to a tuple resident in a `DeletableTupleBuffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TuplePointer {
    frame: u32,
    slot: u32,
    epoch: u32,
}

impl TuplePointer {
    pub fn frame_index(&self) -> usize {
        self.frame as usize
    }

    pub fn tuple_index(&self) -> usize {
        self.slot as usize
    }
}

impl fmt::Display for TuplePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{}@{})", self.frame, self.slot, self.epoch)
    }
}

pub struct DeletableTupleBuffer {
    pool: FramePool,
    frames: Vec<Option<PooledFrame>>,
    free_frames: Vec<usize>,
    epoch: u32,
    num_tuples: usize,
    peak_bytes: PeakTracker,
    peak_tuples: PeakTracker,
}

impl DeletableTupleBuffer {
    /// Buffer limited to `memory_frames` frames of `frame_size` bytes.
    ///
    /// Fails fast when the budget cannot hold a single frame.
    pub fn new(memory_frames: usize, frame_size: usize) -> Result<Self> {
        Ok(Self {
            pool: FramePool::with_frames(memory_frames, frame_size)?,
            frames: Vec::new(),
            free_frames: Vec::new(),
            epoch: 0,
            num_tuples: 0,
            peak_bytes: PeakTracker::new("window_bytes"),
            peak_tuples: PeakTracker::new("window_tuples"),
        })
    }

    /// Store a copy of `tuple`.
    ///
    /// `Ok(None)` means the budget is exhausted; the caller decides what that
    /// means (for the join it is the spill trigger).
    pub fn insert(&mut self, tuple: &Tuple) -> Result<Option<TuplePointer>> {
        let bytes = tuple.encoded_len();
        if bytes > self.pool.frame_size() {
            return Err(Error::TupleTooLarge {
                tuple_bytes: bytes,
                frame_size: self.pool.frame_size(),
            });
        }

        let mut placed = None;
        for (idx, frame) in self.frames.iter_mut().enumerate() {
            if let Some(frame) = frame {
                if let Some(slot) = frame.insert(tuple) {
                    placed = Some((idx, slot));
                    break;
                }
            }
        }

        let (frame_idx, slot) = match placed {
            Some(p) => p,
            None => {
                let Some(mut frame) = self.pool.allocate() else {
                    return Ok(None);
                };
                let slot = frame.insert(tuple).ok_or_else(|| Error::TupleTooLarge {
                    tuple_bytes: bytes,
                    frame_size: frame.capacity(),
                })?;
                let idx = match self.free_frames.pop() {
                    Some(idx) => {
                        self.frames[idx] = Some(frame);
                        idx
                    }
                    None => {
                        self.frames.push(Some(frame));
                        self.frames.len() - 1
                    }
                };
                (idx, slot)
            }
        };

        self.num_tuples += 1;
        self.peak_tuples.record(self.num_tuples);
        self.peak_bytes.record(self.pool.budget().used_bytes());

        Ok(Some(TuplePointer {
            frame: frame_idx as u32,
            slot: slot as u32,
            epoch: self.epoch,
        }))
    }

    /// Read the tuple behind `ptr`. Never mutates.
    pub fn lookup(&self, ptr: TuplePointer) -> Result<&Tuple> {
        self.check_epoch(ptr)?;
        self.frames
            .get(ptr.frame_index())
            .and_then(Option::as_ref)
            .and_then(|f| f.get(ptr.tuple_index()))
            .ok_or_else(|| Error::InvalidPointer(ptr.to_string()))
    }

    /// Remove the tuple behind `ptr`; the pointer is invalid afterwards.
    ///
    /// A frame left without live tuples goes straight back to the pool.
    pub fn delete(&mut self, ptr: TuplePointer) -> Result<Tuple> {
        self.check_epoch(ptr)?;
        let idx = ptr.frame_index();
        let frame = self
            .frames
            .get_mut(idx)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::InvalidPointer(ptr.to_string()))?;
        let tuple = frame
            .remove(ptr.tuple_index())
            .ok_or_else(|| Error::InvalidPointer(ptr.to_string()))?;
        if frame.is_empty() {
            self.frames[idx] = None;
            self.free_frames.push(idx);
        }
        self.num_tuples -= 1;
        Ok(tuple)
    }

    /// Invalidate every pointer and return all frames to the pool.
    pub fn reset(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.frames.clear();
        self.free_frames.clear();
        self.num_tuples = 0;
    }

    pub fn num_tuples(&self) -> usize {
        self.num_tuples
    }

    pub fn is_empty(&self) -> bool {
        self.num_tuples == 0
    }

    /// Frames currently checked out of the pool.
    pub fn num_frames(&self) -> usize {
        self.pool.frames_in_use()
    }

    pub fn capacity_frames(&self) -> usize {
        self.pool.capacity_frames()
    }

    pub fn frame_size(&self) -> usize {
        self.pool.frame_size()
    }

    pub fn used_bytes(&self) -> usize {
        self.pool.budget().used_bytes()
    }

    pub fn peak_bytes(&self) -> usize {
        self.peak_bytes.peak()
    }

    pub fn peak_tuples(&self) -> usize {
        self.peak_tuples.peak()
    }

    fn check_epoch(&self, ptr: TuplePointer) -> Result<()> {
        if ptr.epoch != self.epoch {
            return Err(Error::InvalidPointer(ptr.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spilljoin_core::types::Scalar;

    fn t(v: i64) -> Tuple {
        Tuple::new(vec![Scalar::I64(v)])
    }

    fn two_per_frame(frames: usize) -> DeletableTupleBuffer {
        DeletableTupleBuffer::new(frames, 2 * t(0).encoded_len()).unwrap()
    }

    #[test]
    fn zero_budget_is_rejected() {
        assert!(matches!(
            DeletableTupleBuffer::new(0, 128),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn insert_until_full_then_none() {
        let mut buf = two_per_frame(1);
        let a = buf.insert(&t(1)).unwrap().unwrap();
        let b = buf.insert(&t(2)).unwrap().unwrap();
        assert!(buf.insert(&t(3)).unwrap().is_none());
        assert_eq!(buf.num_tuples(), 2);
        assert_eq!(buf.lookup(a).unwrap(), &t(1));
        assert_eq!(buf.lookup(b).unwrap(), &t(2));
        assert_eq!(buf.peak_tuples(), 2);
    }

    #[test]
    fn delete_frees_room_and_invalidates_pointer() {
        let mut buf = two_per_frame(1);
        let a = buf.insert(&t(1)).unwrap().unwrap();
        let _b = buf.insert(&t(2)).unwrap().unwrap();
        assert_eq!(buf.delete(a).unwrap(), t(1));
        assert!(buf.lookup(a).is_err());
        assert!(buf.delete(a).is_err());
        assert!(buf.insert(&t(3)).unwrap().is_some());
    }

    #[test]
    fn empty_frames_go_back_to_the_pool() {
        let mut buf = two_per_frame(2);
        let ptrs: Vec<_> = (0..4).map(|v| buf.insert(&t(v)).unwrap().unwrap()).collect();
        assert_eq!(buf.num_frames(), 2);
        buf.delete(ptrs[0]).unwrap();
        buf.delete(ptrs[1]).unwrap();
        assert_eq!(buf.num_frames(), 1);
        assert_eq!(buf.lookup(ptrs[3]).unwrap(), &t(3));
    }

    #[test]
    fn reset_invalidates_everything_and_is_idempotent_when_empty() {
        let mut buf = two_per_frame(1);
        buf.reset();
        assert!(buf.is_empty());
        assert_eq!(buf.num_frames(), 0);

        let a = buf.insert(&t(1)).unwrap().unwrap();
        buf.reset();
        assert!(buf.is_empty());
        assert_eq!(buf.used_bytes(), 0);
        assert!(matches!(buf.lookup(a), Err(Error::InvalidPointer(_))));

        // Same arena coordinates, new epoch: the old handle stays dead.
        let b = buf.insert(&t(9)).unwrap().unwrap();
        assert_eq!(b.frame_index(), a.frame_index());
        assert_eq!(b.tuple_index(), a.tuple_index());
        assert!(buf.lookup(a).is_err());
        assert_eq!(buf.lookup(b).unwrap(), &t(9));
    }

    #[test]
    fn oversized_tuple_is_an_error_not_a_full_signal() {
        let mut buf = DeletableTupleBuffer::new(4, 8).unwrap();
        let big = Tuple::new(vec![Scalar::Str("x".repeat(64))]);
        assert!(matches!(
            buf.insert(&big),
            Err(Error::TupleTooLarge { .. })
        ));
    }
}
