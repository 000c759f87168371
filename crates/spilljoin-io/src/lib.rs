#![forbid(unsafe_code)]
//! spilljoin-io: storage backends and streaming frame readers/writers.
//!
//! `FsStorage` and `MemoryStorage` implement `spilljoin_mem::Storage` for run
//! files. The CSV reader and JSONL writer move frames in and out of the CLI.

pub mod error;
pub mod memory_storage;
pub mod readers;
pub mod storage;
pub mod writers;

pub use error::{Error, Result};
pub use memory_storage::MemoryStorage;
pub use readers::csv::CsvFrameReader;
pub use storage::{build_storage, FsStorage};
pub use writers::jsonl::JsonlWriter;
