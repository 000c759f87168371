//! In-memory storage backend for testing.
//!
//! Backs the `memory://` spill scheme so join tests can spill without touching
//! the filesystem. Clones share the same map, which lets a test inspect the
//! run files a join left behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use spilljoin_mem::error::{Error as MemError, Result as MemResult};
use spilljoin_mem::Storage;

type Files = HashMap<String, Vec<u8>>;

#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<Files>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> MemResult<MutexGuard<'_, Files>> {
        self.data
            .lock()
            .map_err(|_| MemError::Storage("memory storage lock poisoned".into()))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files().map(|f| f.contains_key(path)).unwrap_or(false)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.files().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes across all objects.
    pub fn total_bytes(&self) -> u64 {
        self.files()
            .map(|f| f.values().map(|v| v.len() as u64).sum())
            .unwrap_or(0)
    }
}

impl Storage for MemoryStorage {
    fn write(&self, path: &str, bytes: &[u8]) -> MemResult<()> {
        self.files()?.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn append(&self, path: &str, bytes: &[u8]) -> MemResult<()> {
        self.files()?
            .entry(path.to_string())
            .or_default()
            .extend_from_slice(bytes);
        Ok(())
    }

    fn read_range(&self, path: &str, offset: u64, len: usize) -> MemResult<Vec<u8>> {
        let files = self.files()?;
        let bytes = files
            .get(path)
            .ok_or_else(|| MemError::Storage(format!("path not found: {path}")))?;
        let start = offset as usize;
        bytes
            .get(start..start + len)
            .map(|s| s.to_vec())
            .ok_or_else(|| {
                MemError::Storage(format!(
                    "range {start}+{len} exceeds size {}",
                    bytes.len()
                ))
            })
    }

    fn delete(&self, path: &str) -> MemResult<()> {
        self.files()?.remove(path);
        Ok(())
    }

    fn list(&self, prefix: &str) -> MemResult<Vec<String>> {
        let mut result: Vec<String> = self
            .files()?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        result.sort();
        Ok(result)
    }

    fn size(&self, path: &str) -> MemResult<u64> {
        self.files()?
            .get(path)
            .map(|b| b.len() as u64)
            .ok_or_else(|| MemError::Storage(format!("path not found: {path}")))
    }
}
