//! The merge join engine.
//!
//! Driven by the left branch: every left frame runs `process_merge_using_left_tuple`
//! until the frame is used up. Right tuples are pulled on demand through the
//! handoff locks and buffered in a bounded window. When the window is full
//! and another right tuple has to be admitted, the right branch freezes and
//! left tuples are matched against the window and also written to a run
//! file. Once the window drains the run file is replayed against the right
//! tuples that follow, after which the live left stream resumes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use spilljoin_core::config::JoinConfig;
use spilljoin_core::frame::{Frame, FrameTupleAccessor};
use spilljoin_core::id::PartitionId;
use spilljoin_core::schema::Schema;
use spilljoin_core::types::Tuple;
use spilljoin_mem::{Codec, DeletableTupleBuffer, Storage, TuplePointer};
use tracing::{debug, info, warn};

use super::checker::MergeJoinChecker;
use super::locks::MergeJoinLocks;
use super::run_file::RunFileStream;
use super::status::{Branch, MergeStatus, Stage, TupleStatus};
use crate::appender::FrameTupleAppender;
use crate::traits::{FrameWriter, OpError};

/// Counters for one join instance, logged when the left branch closes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinStats {
    pub left_tuples: u64,
    pub right_tuples: u64,
    pub right_admitted: u64,
    pub spills: u64,
    pub spilled_left_tuples: u64,
    pub replayed_left_tuples: u64,
    pub emitted: u64,
    pub peak_window_tuples: u64,
    /// Zero-based right ordinal of the tuple whose admission failed, per spill.
    pub spill_points: Vec<u64>,
}

fn current_left<'a>(
    stream: &'a FrameTupleAccessor,
    run: &'a FrameTupleAccessor,
    replaying: bool,
) -> Result<&'a Tuple, OpError> {
    let accessor = if replaying { run } else { stream };
    accessor
        .tuple()
        .ok_or_else(|| OpError::Exec("no left tuple under the cursor".into()))
}

pub struct MergeJoiner<C: MergeJoinChecker> {
    partition: PartitionId,
    status: MergeStatus,
    locks: Arc<MergeJoinLocks>,
    checker: C,
    left_format: Schema,
    right_format: Schema,
    result_format: Schema,

    buffer: DeletableTupleBuffer,
    window: Vec<TuplePointer>,

    left_stream: FrameTupleAccessor,
    left_run: FrameTupleAccessor,
    right: FrameTupleAccessor,
    /// Right tuples delivered before the frame under `right`.
    right_base: u64,

    run_file: RunFileStream,
    result: FrameTupleAppender,
    stats: JoinStats,
}

impl<C: MergeJoinChecker> MergeJoiner<C> {
    pub fn new(
        config: &JoinConfig,
        checker: C,
        left_format: Schema,
        right_format: Schema,
        locks: Arc<MergeJoinLocks>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, OpError> {
        config.validate()?;
        let codec = Codec::from_name(&config.spill_codec)?;
        let buffer = DeletableTupleBuffer::new(config.memory_frames, config.frame_size)?;
        let partition = PartitionId::new(config.partition);
        let run_file = RunFileStream::new(
            storage,
            &config.spill_dir,
            "left",
            partition,
            codec,
            config.frame_size,
        );

        debug!(
            version = spilljoin_core::VERSION,
            "merge joiner has started {} with {} frames of memory ({} bytes each)",
            partition, config.memory_frames, config.frame_size
        );

        Ok(Self {
            partition,
            status: MergeStatus::new(),
            locks,
            checker,
            result_format: Schema::concat(&left_format, &right_format),
            left_format,
            right_format,
            buffer,
            window: Vec::new(),
            left_stream: FrameTupleAccessor::new(),
            left_run: FrameTupleAccessor::new(),
            right: FrameTupleAccessor::new(),
            right_base: 0,
            run_file,
            result: FrameTupleAppender::new(config.frame_size),
            stats: JoinStats::default(),
        })
    }

    pub fn left_format(&self) -> &Schema {
        &self.left_format
    }

    pub fn right_format(&self) -> &Schema {
        &self.right_format
    }

    pub fn result_format(&self) -> &Schema {
        &self.result_format
    }

    pub fn status(&self) -> &MergeStatus {
        &self.status
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn stats(&self) -> JoinStats {
        let mut stats = self.stats.clone();
        stats.peak_window_tuples = self.buffer.peak_tuples() as u64;
        stats.replayed_left_tuples = self.run_file.tuples_read();
        stats
    }

    /// Install the next left frame. The previous one must be used up.
    pub fn set_left_frame(&mut self, frame: Frame) {
        self.stats.left_tuples += frame.tuple_count() as u64;
        self.status[Branch::Left].set_stage(Stage::DataProcessing);
        self.left_stream.reset(frame);
    }

    fn memory_has_tuples(&self) -> bool {
        !self.window.is_empty()
    }

    fn load_memory_tuple(&self, branch: Branch) -> TupleStatus {
        let accessor = match branch {
            Branch::Left => &self.left_stream,
            Branch::Right => &self.right,
        };
        if accessor.exists() {
            TupleStatus::Loaded
        } else if self.status[branch].has_more() {
            TupleStatus::Unknown
        } else {
            TupleStatus::Empty
        }
    }

    fn load_left_tuple(&mut self) -> Result<TupleStatus, OpError> {
        loop {
            if !self.run_file.is_replaying() {
                return Ok(self.load_memory_tuple(Branch::Left));
            }
            if self.left_run.exists() || self.run_file.load_next_buffer(&mut self.left_run)? {
                return Ok(TupleStatus::Loaded);
            }
            self.continue_stream()?;
        }
    }

    fn load_right_tuple(&mut self) -> Result<TupleStatus, OpError> {
        let loaded = self.load_memory_tuple(Branch::Right);
        if loaded == TupleStatus::Unknown {
            return self.pause_and_load_right_tuple();
        }
        Ok(loaded)
    }

    /// Block until the right producer hands over a frame or closes.
    fn pause_and_load_right_tuple(&mut self) -> Result<TupleStatus, OpError> {
        loop {
            match self.locks.request_right_frame()? {
                Some(frame) if frame.is_empty() => continue,
                Some(frame) => {
                    self.right_base += self.right.tuple_count() as u64;
                    self.stats.right_tuples += frame.tuple_count() as u64;
                    self.status[Branch::Right].set_stage(Stage::DataProcessing);
                    self.right.reset(frame);
                    return Ok(TupleStatus::Loaded);
                }
                None => {
                    self.right_base += self.right.tuple_count() as u64;
                    self.right.clear();
                    let right = &mut self.status[Branch::Right];
                    right.no_more();
                    right.set_stage(Stage::Closed);
                    return Ok(TupleStatus::Empty);
                }
            }
        }
    }

    /// Process the current left frame as far as it goes.
    pub fn process_merge_using_left_tuple<W: FrameWriter + ?Sized>(
        &mut self,
        writer: &mut W,
    ) -> Result<(), OpError> {
        let mut ts = self.load_left_tuple()?;
        while ts.is_loaded() && (self.status[Branch::Right].has_more() || self.memory_has_tuples())
        {
            if self.status[Branch::Left].is_run_file_writing() {
                self.process_left_tuple_spill(writer)?;
                ts = self.load_left_tuple()?;
            } else if self.load_right_tuple()?.is_loaded() && self.should_load_next_right()? {
                self.process_right_tuple()?;
            } else {
                self.process_left_tuple(writer)?;
                ts = self.load_left_tuple()?;
            }
        }
        Ok(())
    }

    fn should_load_next_right(&self) -> Result<bool, OpError> {
        let left = current_left(&self.left_stream, &self.left_run, self.run_file.is_replaying())?;
        let right = self
            .right
            .tuple()
            .ok_or_else(|| OpError::Exec("no right tuple under the cursor".into()))?;
        self.checker.check_to_load_next_right_tuple(left, right)
    }

    fn process_left_tuple_spill<W: FrameWriter + ?Sized>(
        &mut self,
        writer: &mut W,
    ) -> Result<(), OpError> {
        let left = current_left(&self.left_stream, &self.left_run, self.run_file.is_replaying())?;
        self.run_file.add_to_run_file(left)?;
        self.stats.spilled_left_tuples += 1;
        self.process_left_tuple(writer)?;
        // Window drained: the run file can be replayed.
        if !self.memory_has_tuples() && self.status[Branch::Left].is_run_file_writing() {
            self.unfreeze_and_continue()?;
        }
        Ok(())
    }

    /// Match the current left tuple against the window, newest entry first,
    /// evicting entries the checker is done with, then advance the left cursor.
    fn process_left_tuple<W: FrameWriter + ?Sized>(
        &mut self,
        writer: &mut W,
    ) -> Result<(), OpError> {
        let replaying = self.run_file.is_replaying();
        {
            let left = current_left(&self.left_stream, &self.left_run, replaying)?;
            let mut i = self.window.len();
            while i > 0 {
                i -= 1;
                let ptr = self.window[i];
                let entry = self.buffer.lookup(ptr)?;
                if self.checker.check_to_save_in_result(left, entry, false)? {
                    self.result.append_concat(writer, left, entry)?;
                    self.stats.emitted += 1;
                }
                if self.checker.check_to_remove_in_memory(left, entry)? {
                    self.window.remove(i);
                    self.buffer.delete(ptr)?;
                }
            }
        }
        if replaying {
            self.left_run.next();
        } else {
            self.left_stream.next();
        }
        Ok(())
    }

    fn process_right_tuple(&mut self) -> Result<(), OpError> {
        let left = current_left(&self.left_stream, &self.left_run, self.run_file.is_replaying())?;
        let right = self
            .right
            .tuple()
            .ok_or_else(|| OpError::Exec("no right tuple under the cursor".into()))?;
        if self.checker.check_to_save_in_memory(left, right)? {
            match self.buffer.insert(right)? {
                Some(ptr) => {
                    self.window.push(ptr);
                    self.stats.right_admitted += 1;
                }
                None => {
                    self.freeze_and_spill()?;
                    return Ok(());
                }
            }
        }
        self.right.next();
        Ok(())
    }

    fn right_ordinal(&self) -> u64 {
        self.right_base + self.right.tuple_id() as u64
    }

    fn freeze_and_spill(&mut self) -> Result<(), OpError> {
        if !self.memory_has_tuples() {
            return Err(OpError::Exec(format!(
                "right tuple {} does not fit an empty window",
                self.right_ordinal()
            )));
        }
        self.run_file
            .start_run_file(&mut self.status[Branch::Left])?;
        self.stats.spills += 1;
        self.stats.spill_points.push(self.right_ordinal());
        debug!(
            "memory is full, freezing the right branch at right tuple {} (memory tuples: {}, frames: {})",
            self.right_ordinal(),
            self.buffer.num_tuples(),
            self.buffer.num_frames()
        );
        Ok(())
    }

    fn continue_stream(&mut self) -> Result<(), OpError> {
        self.run_file
            .close_run_file(&mut self.status[Branch::Left])?;
        self.left_run.clear();
        debug!("continue with left stream");
        Ok(())
    }

    fn flush_memory(&mut self) {
        self.buffer.reset();
        self.window.clear();
    }

    fn unfreeze_and_continue(&mut self) -> Result<(), OpError> {
        self.run_file
            .flush_and_stop_run_file(&mut self.left_run, &mut self.status[Branch::Left])?;
        self.flush_memory();
        self.run_file
            .open_run_file(&mut self.left_run, &mut self.status[Branch::Left])?;
        debug!(
            "unfreezing right branch, replaying {} spilled left tuples so far",
            self.stats.spilled_left_tuples
        );
        Ok(())
    }

    /// The left branch has no more frames: finish every pending replay.
    ///
    /// If the left side ends while spilling, every window entry has already
    /// been matched against every left tuple there will ever be, so the window
    /// is dropped and the run file replayed against the remaining right tuples.
    pub fn process_left_close<W: FrameWriter + ?Sized>(
        &mut self,
        writer: &mut W,
    ) -> Result<(), OpError> {
        self.status[Branch::Left].no_more();
        loop {
            self.process_merge_using_left_tuple(writer)?;
            if !self.status[Branch::Left].is_run_file_writing() {
                break;
            }
            debug!("left branch closed while spilling");
            self.unfreeze_and_continue()?;
        }
        self.run_file
            .close_run_file(&mut self.status[Branch::Left])?;
        self.close_result(writer)?;
        self.status[Branch::Left].set_stage(Stage::Closed);

        let stats = self.stats();
        info!(
            partition = self.partition.get(),
            left_tuples = stats.left_tuples,
            right_tuples = stats.right_tuples,
            emitted = stats.emitted,
            spills = stats.spills,
            spilled_left_tuples = stats.spilled_left_tuples,
            replayed_left_tuples = stats.replayed_left_tuples,
            peak_window_tuples = stats.peak_window_tuples,
            "merge join finished"
        );
        Ok(())
    }

    pub fn close_result<W: FrameWriter + ?Sized>(&mut self, writer: &mut W) -> Result<(), OpError> {
        self.result.write(writer)
    }

    /// Release the window, delete run files and wake the right branch.
    pub fn abort(&mut self) {
        if let Err(e) = self.run_file.abort() {
            warn!(partition = self.partition.get(), error = %e, "failed to delete run files on abort");
        }
        self.flush_memory();
        self.left_stream.clear();
        self.left_run.clear();
        self.right.clear();
        self.locks.abort();
        debug!("merge joiner for {} aborted", self.partition);
    }
}
