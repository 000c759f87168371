//! Run files: append-only sequences of frame records on a `Storage` backend.
//!
//! A `RunFileWriter` appends frames one record at a time; a `RunFileReader`
//! replays them front to back. Each record is self-describing (see
//! `segment`), so readers need only the path and total length.

pub mod codec;
pub mod segment;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use spilljoin_core::frame::Frame;

use crate::error::{Error, Result};

pub use codec::Codec;
pub use segment::{SegmentHeader, CHECKSUM_LEN, HEADER_LEN};

/// Abstract storage interface for run files.
///
/// Implemented by `spilljoin-io::FsStorage` for the local filesystem and by
/// `spilljoin-io::MemoryStorage` for tests.
pub trait Storage: Send + Sync {
    /// Write bytes to a path, replacing any previous content.
    fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Append bytes to a path, creating it if missing.
    fn append(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Read a byte range from a path. Returns exactly `len` bytes or error.
    fn read_range(&self, path: &str, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Delete a path. Idempotent.
    fn delete(&self, path: &str) -> Result<()>;

    /// List all paths under a prefix.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Size of a path in bytes.
    fn size(&self, path: &str) -> Result<u64>;
}

/// Everything needed to replay a closed run file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFileHandle {
    pub path: String,
    pub len: u64,
    pub frames: u64,
    pub tuples: u64,
}

impl fmt::Display for RunFileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} frames, {} tuples, {} bytes)",
            self.path, self.frames, self.tuples, self.len
        )
    }
}

pub struct RunFileWriter {
    storage: Arc<dyn Storage>,
    path: String,
    codec: Codec,
    offset: u64,
    frames: u64,
    tuples: u64,
}

impl RunFileWriter {
    /// Create (or truncate) the file at `path`.
    pub fn create(storage: Arc<dyn Storage>, path: impl Into<String>, codec: Codec) -> Result<Self> {
        let path = path.into();
        storage.write(&path, &[])?;
        tracing::trace!(path = %path, ?codec, "run file created");
        Ok(Self {
            storage,
            path,
            codec,
            offset: 0,
            frames: 0,
            tuples: 0,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    pub fn tuples_written(&self) -> u64 {
        self.tuples
    }

    /// Append one frame. Empty frames are skipped.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.is_empty() {
            return Ok(());
        }
        let record = segment::encode_frame(self.codec, frame)?;
        self.storage.append(&self.path, &record)?;
        self.offset += record.len() as u64;
        self.frames += 1;
        self.tuples += frame.tuple_count() as u64;
        tracing::trace!(
            path = %self.path,
            bytes = record.len(),
            tuples = frame.tuple_count(),
            "run file frame appended"
        );
        Ok(())
    }

    pub fn close(self) -> RunFileHandle {
        RunFileHandle {
            path: self.path,
            len: self.offset,
            frames: self.frames,
            tuples: self.tuples,
        }
    }

    /// Drop the partially written file.
    pub fn abort(self) -> Result<()> {
        self.storage.delete(&self.path)
    }
}

pub struct RunFileReader {
    storage: Arc<dyn Storage>,
    handle: RunFileHandle,
    offset: u64,
}

impl RunFileReader {
    pub fn open(storage: Arc<dyn Storage>, handle: RunFileHandle) -> Result<Self> {
        let actual = storage.size(&handle.path)?;
        if actual < handle.len {
            return Err(Error::Storage(format!(
                "run file {} is {actual} bytes, expected {}",
                handle.path, handle.len
            )));
        }
        Ok(Self {
            storage,
            handle,
            offset: 0,
        })
    }

    pub fn handle(&self) -> &RunFileHandle {
        &self.handle
    }

    pub fn is_exhausted(&self) -> bool {
        self.offset >= self.handle.len
    }

    /// Read the next frame, or `None` once the file is exhausted.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.is_exhausted() {
            return Ok(None);
        }
        let at = self.offset;
        let header_bytes = self.storage.read_range(&self.handle.path, at, HEADER_LEN)?;
        let header = SegmentHeader::from_bytes(&header_bytes)?;
        let body = self.storage.read_range(
            &self.handle.path,
            at + HEADER_LEN as u64,
            header.body_len(),
        )?;
        let frame = segment::decode_frame(&header_bytes, &body)?.ok_or_else(|| {
            Error::ChecksumMismatch {
                path: self.handle.path.clone(),
                offset: at,
            }
        })?;
        self.offset = at + (HEADER_LEN + header.body_len()) as u64;
        Ok(Some(frame))
    }

    /// Remove the underlying file.
    pub fn delete(self) -> Result<()> {
        self.storage.delete(&self.handle.path)
    }
}

#[cfg(test)]
pub(crate) mod test_storage {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::Storage;
    use crate::error::{Error, Result};

    #[derive(Default)]
    pub struct VecStorage {
        files: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl Storage for VecStorage {
        fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
            self.files.lock().unwrap().insert(path.into(), bytes.to_vec());
            Ok(())
        }

        fn append(&self, path: &str, bytes: &[u8]) -> Result<()> {
            self.files
                .lock()
                .unwrap()
                .entry(path.into())
                .or_default()
                .extend_from_slice(bytes);
            Ok(())
        }

        fn read_range(&self, path: &str, offset: u64, len: usize) -> Result<Vec<u8>> {
            let files = self.files.lock().unwrap();
            let data = files
                .get(path)
                .ok_or_else(|| Error::Storage(format!("missing {path}")))?;
            let start = offset as usize;
            data.get(start..start + len)
                .map(|s| s.to_vec())
                .ok_or_else(|| Error::Storage("short read".into()))
        }

        fn delete(&self, path: &str) -> Result<()> {
            self.files.lock().unwrap().remove(path);
            Ok(())
        }

        fn list(&self, prefix: &str) -> Result<Vec<String>> {
            let files = self.files.lock().unwrap();
            Ok(files.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
        }

        fn size(&self, path: &str) -> Result<u64> {
            let files = self.files.lock().unwrap();
            files
                .get(path)
                .map(|d| d.len() as u64)
                .ok_or_else(|| Error::Storage(format!("missing {path}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_storage::VecStorage;
    use super::*;
    use spilljoin_core::types::{Scalar, Tuple};

    fn frames() -> Vec<Frame> {
        Frame::pack(64, (0..20).map(|i| Tuple::new(vec![Scalar::I64(i)])))
    }

    #[test]
    fn replays_frames_in_write_order() {
        let storage: Arc<dyn Storage> = Arc::new(VecStorage::default());
        let mut w = RunFileWriter::create(storage.clone(), "spill/a.run", Codec::None).unwrap();
        let input = frames();
        assert!(input.len() > 1);
        for f in &input {
            w.write_frame(f).unwrap();
        }
        let handle = w.close();
        assert_eq!(handle.frames, input.len() as u64);
        assert_eq!(handle.tuples, 20);

        let mut r = RunFileReader::open(storage.clone(), handle).unwrap();
        let mut out = Vec::new();
        while let Some(f) = r.next_frame().unwrap() {
            out.push(f);
        }
        assert_eq!(out, input);
        assert!(r.is_exhausted());
        r.delete().unwrap();
        assert!(storage.list("spill/").unwrap().is_empty());
    }

    #[test]
    fn empty_run_file_yields_nothing() {
        let storage: Arc<dyn Storage> = Arc::new(VecStorage::default());
        let mut w = RunFileWriter::create(storage.clone(), "e.run", Codec::None).unwrap();
        w.write_frame(&Frame::new(64)).unwrap();
        let handle = w.close();
        assert_eq!(handle.len, 0);
        let mut r = RunFileReader::open(storage, handle).unwrap();
        assert!(r.next_frame().unwrap().is_none());
    }

    #[test]
    fn corrupted_record_reports_position() {
        let storage = Arc::new(VecStorage::default());
        let dyn_storage: Arc<dyn Storage> = storage.clone();
        let mut w = RunFileWriter::create(dyn_storage.clone(), "c.run", Codec::None).unwrap();
        for f in frames().iter().take(2) {
            w.write_frame(f).unwrap();
        }
        let handle = w.close();

        let mut bytes = storage.read_range("c.run", 0, handle.len as usize).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        storage.write("c.run", &bytes).unwrap();

        let mut r = RunFileReader::open(dyn_storage, handle).unwrap();
        r.next_frame().unwrap();
        match r.next_frame() {
            Err(Error::ChecksumMismatch { offset, .. }) => assert!(offset > 0),
            other => panic!("expected checksum mismatch, got {other:?}"),
        }
    }
}
