//! Fixed-capacity frames and the tuple cursor over them.
//!
//! A `Frame` is the unit of transfer between producers, the join, the run file
//! and the output writer. Its capacity is a byte budget measured with
//! `Tuple::encoded_len`, so a memory budget of N frames bounds resident bytes.

use serde::{Deserialize, Serialize};

use crate::types::Tuple;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    capacity: usize,
    used: usize,
    tuples: Vec<Tuple>,
}

impl Frame {
    /// Create an empty frame holding at most `capacity` encoded bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: 0,
            tuples: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used_bytes(&self) -> usize {
        self.used
    }

    pub fn tuple_count(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn tuples(&self) -> &[Tuple] {
        &self.tuples
    }

    pub fn tuple(&self, idx: usize) -> Option<&Tuple> {
        self.tuples.get(idx)
    }

    /// An empty frame accepts any single tuple, so oversized records still travel.
    pub fn fits(&self, tuple: &Tuple) -> bool {
        self.tuples.is_empty() || self.used + tuple.encoded_len() <= self.capacity
    }

    /// Append `tuple` if it fits; hands it back otherwise.
    pub fn try_append(&mut self, tuple: Tuple) -> Result<(), Tuple> {
        if !self.fits(&tuple) {
            return Err(tuple);
        }
        self.used += tuple.encoded_len();
        self.tuples.push(tuple);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.used = 0;
        self.tuples.clear();
    }

    pub fn into_tuples(self) -> Vec<Tuple> {
        self.tuples
    }

    /// Pack tuples into as many frames of `capacity` bytes as needed, in order.
    pub fn pack<I>(capacity: usize, tuples: I) -> Vec<Frame>
    where
        I: IntoIterator<Item = Tuple>,
    {
        let mut frames = Vec::new();
        let mut current = Frame::new(capacity);
        for t in tuples {
            if let Err(t) = current.try_append(t) {
                frames.push(std::mem::replace(&mut current, Frame::new(capacity)));
                let accepted = current.try_append(t).is_ok();
                debug_assert!(accepted, "an empty frame always accepts one tuple");
            }
        }
        if !current.is_empty() {
            frames.push(current);
        }
        frames
    }
}

/// Cursor over the tuples of one frame.
///
/// `reset` positions the cursor on the first tuple; `exists` is false once the
/// cursor runs off the end (or before any frame was installed).
#[derive(Debug, Default)]
pub struct FrameTupleAccessor {
    frame: Option<Frame>,
    tuple_id: usize,
}

impl FrameTupleAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `frame` and point at its first tuple. Returns the previous frame.
    pub fn reset(&mut self, frame: Frame) -> Option<Frame> {
        self.tuple_id = 0;
        self.frame.replace(frame)
    }

    /// Drop the installed frame; `exists` becomes false.
    pub fn clear(&mut self) -> Option<Frame> {
        self.tuple_id = 0;
        self.frame.take()
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    pub fn tuple_count(&self) -> usize {
        self.frame.as_ref().map(Frame::tuple_count).unwrap_or(0)
    }

    pub fn exists(&self) -> bool {
        self.tuple_id < self.tuple_count()
    }

    pub fn next(&mut self) {
        if self.tuple_id < self.tuple_count() {
            self.tuple_id += 1;
        }
    }

    pub fn tuple_id(&self) -> usize {
        self.tuple_id
    }

    pub fn set_tuple_id(&mut self, id: usize) {
        self.tuple_id = id;
    }

    /// Tuple under the cursor, if any.
    pub fn tuple(&self) -> Option<&Tuple> {
        self.frame.as_ref().and_then(|f| f.tuple(self.tuple_id))
    }

    /// Tuples from the cursor to the end of the frame (cursor not moved).
    pub fn remaining(&self) -> &[Tuple] {
        match &self.frame {
            Some(f) if self.tuple_id < f.tuple_count() => &f.tuples()[self.tuple_id..],
            _ => &[],
        }
    }
}
