//! Output side: packs joined tuples into frames and hands full frames to a
//! `FrameWriter`.

use spilljoin_core::frame::Frame;
use spilljoin_core::types::Tuple;

use crate::traits::{FrameWriter, OpError};

pub struct FrameTupleAppender {
    frame: Frame,
    frames_written: u64,
    tuples_appended: u64,
}

impl FrameTupleAppender {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame: Frame::new(frame_size),
            frames_written: 0,
            tuples_appended: 0,
        }
    }

    /// Append `left ++ right`, writing the current frame out first if the
    /// result does not fit.
    pub fn append_concat<W: FrameWriter + ?Sized>(
        &mut self,
        writer: &mut W,
        left: &Tuple,
        right: &Tuple,
    ) -> Result<(), OpError> {
        self.append(writer, Tuple::concat(left, right))
    }

    pub fn append<W: FrameWriter + ?Sized>(
        &mut self,
        writer: &mut W,
        tuple: Tuple,
    ) -> Result<(), OpError> {
        if let Err(tuple) = self.frame.try_append(tuple) {
            self.write(writer)?;
            let accepted = self.frame.try_append(tuple).is_ok();
            debug_assert!(accepted, "an empty frame always accepts one tuple");
        }
        self.tuples_appended += 1;
        Ok(())
    }

    /// Write the pending frame (if any) and start a fresh one.
    pub fn write<W: FrameWriter + ?Sized>(&mut self, writer: &mut W) -> Result<(), OpError> {
        if self.frame.is_empty() {
            return Ok(());
        }
        writer.next_frame(&self.frame)?;
        self.frame.clear();
        self.frames_written += 1;
        Ok(())
    }

    pub fn pending_tuples(&self) -> usize {
        self.frame.tuple_count()
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn tuples_appended(&self) -> u64 {
        self.tuples_appended
    }
}

/// Keeps every written frame in memory.
#[derive(Debug, Default)]
pub struct CollectingWriter {
    pub frames: Vec<Frame>,
}

impl CollectingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.frames.iter().flat_map(|f| f.tuples().iter())
    }

    pub fn tuple_count(&self) -> usize {
        self.frames.iter().map(Frame::tuple_count).sum()
    }

    pub fn into_tuples(self) -> Vec<Tuple> {
        self.frames.into_iter().flat_map(Frame::into_tuples).collect()
    }
}

impl FrameWriter for CollectingWriter {
    fn next_frame(&mut self, frame: &Frame) -> Result<(), OpError> {
        self.frames.push(frame.clone());
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

    #[test]
    fn full_frames_are_written_and_trailing_frame_on_write() {
        let pair = Tuple::concat(&t(0), &t(0)).encoded_len();
        let mut app = FrameTupleAppender::new(pair * 2);
        let mut out = CollectingWriter::new();

        for i in 0..5 {
            app.append_concat(&mut out, &t(i), &t(i * 10)).unwrap();
        }
        assert_eq!(out.frames.len(), 2);
        assert_eq!(app.pending_tuples(), 1);

        app.write(&mut out).unwrap();
        app.write(&mut out).unwrap();
        assert_eq!(out.frames.len(), 3);
        assert_eq!(app.tuples_appended(), 5);

        let firsts: Vec<_> = out.tuples().map(|t| t.fields[0].clone()).collect();
        assert_eq!(firsts, (0..5).map(Scalar::I64).collect::<Vec<_>>());
        assert_eq!(out.into_tuples()[4].fields[1], Scalar::I64(40));
    }

    #[test]
    fn results_wider_than_a_frame_are_not_dropped() {
        let mut app = FrameTupleAppender::new(1);
        let mut out = CollectingWriter::new();
        for i in 0..3 {
            app.append_concat(&mut out, &t(i), &t(i)).unwrap();
        }
        app.write(&mut out).unwrap();
        assert_eq!(out.frames.len(), 3);
        assert_eq!(out.tuple_count(), 3);
    }
}
