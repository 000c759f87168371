//! Spill side of the left branch: a run file written while the right branch
//! is frozen, then replayed once the window drains.
//!
//! A file goes through one writer epoch and one reader epoch and is deleted
//! when its replay ends. Spilling can begin again during a replay; the unread
//! rest of the old file is then carried into the new one when the writer
//! epoch stops, so no spilled tuple is dropped or reordered.

use std::sync::Arc;

use spilljoin_core::frame::{Frame, FrameTupleAccessor};
use spilljoin_core::id::{PartitionId, SpillId};
use spilljoin_core::types::Tuple;
use spilljoin_mem::spill::RunFileHandle;
use spilljoin_mem::{Codec, RunFileReader, RunFileWriter, Storage};

use super::status::BranchStatus;
use crate::traits::OpError;

pub struct RunFileStream {
    storage: Arc<dyn Storage>,
    dir: String,
    key: &'static str,
    partition: PartitionId,
    codec: Codec,
    appender: Frame,
    writer: Option<RunFileWriter>,
    closed: Option<RunFileHandle>,
    reader: Option<RunFileReader>,
    files_created: u64,
    tuples_written: u64,
    tuples_carried: u64,
    tuples_read: u64,
}

impl RunFileStream {
    pub fn new(
        storage: Arc<dyn Storage>,
        dir: &str,
        key: &'static str,
        partition: PartitionId,
        codec: Codec,
        frame_size: usize,
    ) -> Self {
        let dir = dir.strip_prefix("file://").unwrap_or(dir);
        Self {
            storage,
            dir: dir.trim_end_matches('/').to_string(),
            key,
            partition,
            codec,
            appender: Frame::new(frame_size),
            writer: None,
            closed: None,
            reader: None,
            files_created: 0,
            tuples_written: 0,
            tuples_carried: 0,
            tuples_read: 0,
        }
    }

    fn next_path(&self) -> String {
        let id = SpillId::next();
        format!(
            "{}/p{}-{}-{}-{}.run",
            self.dir,
            self.partition.get(),
            self.key,
            std::process::id(),
            id.get()
        )
    }

    /// A writer epoch is open.
    pub fn is_writing(&self) -> bool {
        self.writer.is_some()
    }

    /// A file is being replayed (possibly while a new one is written).
    pub fn is_replaying(&self) -> bool {
        self.reader.is_some()
    }

    pub fn start_run_file(&mut self, status: &mut BranchStatus) -> Result<(), OpError> {
        let path = self.next_path();
        self.writer = Some(RunFileWriter::create(
            self.storage.clone(),
            path.clone(),
            self.codec,
        )?);
        self.appender.clear();
        self.files_created += 1;
        status.set_run_file_writing(true);
        tracing::trace!(path = %path, replaying = self.is_replaying(), "run file started");
        Ok(())
    }

    fn append(writer: &mut RunFileWriter, appender: &mut Frame, tuple: Tuple) -> Result<(), OpError> {
        if let Err(tuple) = appender.try_append(tuple) {
            writer.write_frame(appender)?;
            appender.clear();
            let accepted = appender.try_append(tuple).is_ok();
            debug_assert!(accepted, "an empty frame always accepts one tuple");
        }
        Ok(())
    }

    /// Record a left tuple. No-op outside a writer epoch.
    pub fn add_to_run_file(&mut self, tuple: &Tuple) -> Result<(), OpError> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        Self::append(writer, &mut self.appender, tuple.clone())?;
        self.tuples_written += 1;
        Ok(())
    }

    /// End the writer epoch.
    ///
    /// If the spill started during a replay, the rest of `accessor`'s frame
    /// and every unread frame of the replayed file are appended first and the
    /// replayed file is deleted.
    pub fn flush_and_stop_run_file(
        &mut self,
        accessor: &mut FrameTupleAccessor,
        status: &mut BranchStatus,
    ) -> Result<(), OpError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };

        if let Some(mut reader) = self.reader.take() {
            for tuple in accessor.remaining() {
                Self::append(&mut writer, &mut self.appender, tuple.clone())?;
                self.tuples_carried += 1;
            }
            accessor.clear();
            if !self.appender.is_empty() {
                writer.write_frame(&self.appender)?;
                self.appender.clear();
            }
            while let Some(frame) = reader.next_frame()? {
                self.tuples_carried += frame.tuple_count() as u64;
                writer.write_frame(&frame)?;
            }
            tracing::trace!(from = %reader.handle().path, to = writer.path(), "replay remainder carried over");
            reader.delete()?;
        }

        if !self.appender.is_empty() {
            writer.write_frame(&self.appender)?;
            self.appender.clear();
        }
        let handle = writer.close();
        tracing::trace!(run_file = %handle, "run file stopped");
        self.closed = Some(handle);
        status.set_run_file_writing(false);
        Ok(())
    }

    /// Begin replaying the file closed by the last writer epoch and load its
    /// first frame into `accessor`.
    pub fn open_run_file(
        &mut self,
        accessor: &mut FrameTupleAccessor,
        status: &mut BranchStatus,
    ) -> Result<bool, OpError> {
        let handle = self
            .closed
            .take()
            .ok_or_else(|| OpError::Exec("no closed run file to replay".into()))?;
        self.reader = Some(RunFileReader::open(self.storage.clone(), handle)?);
        status.set_run_file_reading(true);
        self.load_next_buffer(accessor)
    }

    /// Load the next stored frame; `false` once the file is exhausted.
    pub fn load_next_buffer(&mut self, accessor: &mut FrameTupleAccessor) -> Result<bool, OpError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(false);
        };
        while let Some(frame) = reader.next_frame()? {
            if frame.is_empty() {
                continue;
            }
            self.tuples_read += frame.tuple_count() as u64;
            accessor.reset(frame);
            return Ok(true);
        }
        accessor.clear();
        Ok(false)
    }

    /// End the reader epoch and delete the replayed file.
    pub fn close_run_file(&mut self, status: &mut BranchStatus) -> Result<(), OpError> {
        if let Some(reader) = self.reader.take() {
            tracing::trace!(run_file = %reader.handle(), "run file replay closed");
            reader.delete()?;
        }
        status.set_run_file_reading(false);
        Ok(())
    }

    /// Delete every file this stream still holds.
    pub fn abort(&mut self) -> Result<(), OpError> {
        let mut first_err = None;
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.abort() {
                first_err.get_or_insert(e);
            }
        }
        if let Some(reader) = self.reader.take() {
            if let Err(e) = reader.delete() {
                first_err.get_or_insert(e);
            }
        }
        if let Some(handle) = self.closed.take() {
            if let Err(e) = self.storage.delete(&handle.path) {
                first_err.get_or_insert(e);
            }
        }
        self.appender.clear();
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    pub fn files_created(&self) -> u64 {
        self.files_created
    }

    pub fn tuples_written(&self) -> u64 {
        self.tuples_written
    }

    pub fn tuples_carried(&self) -> u64 {
        self.tuples_carried
    }

    pub fn tuples_read(&self) -> u64 {
        self.tuples_read
    }
}
