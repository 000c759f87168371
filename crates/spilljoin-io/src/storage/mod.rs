//! Storage adapters implementing `spilljoin_mem::Storage`.
//!
//! The spill directory picks the backend: `memory://` keeps run files in a
//! process-local map (tests), anything else is a filesystem path.

mod fs;
pub use fs::FsStorage;

use std::sync::Arc;

use spilljoin_core::config::JoinConfig;
use spilljoin_mem::Storage;

use crate::error::{Error, Result};
use crate::memory_storage::MemoryStorage;

/// Build the run-file backend for `cfg.spill_dir`.
pub fn build_storage(cfg: &JoinConfig) -> Result<Arc<dyn Storage>> {
    match cfg.spill_dir.split_once("://") {
        Some(("memory", _)) => {
            tracing::debug!(spill_dir = %cfg.spill_dir, "using in-memory run files");
            Ok(Arc::new(MemoryStorage::new()))
        }
        Some(("file", _)) | None => {
            tracing::debug!(spill_dir = %cfg.spill_dir, "using filesystem run files");
            Ok(Arc::new(FsStorage::new()))
        }
        Some((other, _)) => Err(Error::Config(format!(
            "unsupported spill scheme '{other}'"
        ))),
    }
}
