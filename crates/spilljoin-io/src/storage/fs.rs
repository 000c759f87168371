use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use spilljoin_mem::error::{Error as MemError, Result as MemResult};
use spilljoin_mem::Storage;

/// Local filesystem storage (rooted at the host filesystem).
#[derive(Debug, Clone, Default)]
pub struct FsStorage;

impl FsStorage {
    pub fn new() -> Self {
        Self
    }
}

fn ensure_parent(p: &Path) -> MemResult<()> {
    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent).map_err(|e| MemError::Storage(format!("mkparent: {e}")))?;
    }
    Ok(())
}

impl Storage for FsStorage {
    fn write(&self, path: &str, bytes: &[u8]) -> MemResult<()> {
        let p = Path::new(path);
        ensure_parent(p)?;
        let mut f = File::create(p).map_err(|e| MemError::Storage(format!("create: {e}")))?;
        f.write_all(bytes)
            .map_err(|e| MemError::Storage(format!("write: {e}")))?;
        f.flush()
            .map_err(|e| MemError::Storage(format!("flush: {e}")))?;
        Ok(())
    }

    fn append(&self, path: &str, bytes: &[u8]) -> MemResult<()> {
        let p = Path::new(path);
        ensure_parent(p)?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(p)
            .map_err(|e| MemError::Storage(format!("open for append: {e}")))?;
        f.write_all(bytes)
            .map_err(|e| MemError::Storage(format!("append: {e}")))?;
        Ok(())
    }

    fn read_range(&self, path: &str, offset: u64, len: usize) -> MemResult<Vec<u8>> {
        let mut f =
            File::open(Path::new(path)).map_err(|e| MemError::Storage(format!("open: {e}")))?;
        f.seek(SeekFrom::Start(offset))
            .map_err(|e| MemError::Storage(format!("seek: {e}")))?;
        let mut buf = vec![0u8; len];
        f.read_exact(&mut buf)
            .map_err(|e| MemError::Storage(format!("read {len} bytes at {offset}: {e}")))?;
        Ok(buf)
    }

    fn delete(&self, path: &str) -> MemResult<()> {
        let p = Path::new(path);
        if p.exists() {
            fs::remove_file(p).map_err(|e| MemError::Storage(format!("delete: {e}")))?;
        }
        Ok(())
    }

    fn list(&self, prefix: &str) -> MemResult<Vec<String>> {
        let dir = Path::new(prefix);
        let mut results = Vec::new();
        if !dir.is_dir() {
            return Ok(results);
        }
        for entry in fs::read_dir(dir).map_err(|e| MemError::Storage(format!("list: {e}")))? {
            let entry = entry.map_err(|e| MemError::Storage(format!("list: {e}")))?;
            let path = entry.path();
            if path.is_file() {
                if let Some(s) = path.to_str() {
                    results.push(s.to_string());
                }
            }
        }
        results.sort();
        Ok(results)
    }

    fn size(&self, path: &str) -> MemResult<u64> {
        let meta =
            fs::metadata(Path::new(path)).map_err(|e| MemError::Storage(format!("size: {e}")))?;
        Ok(meta.len())
    }
}
