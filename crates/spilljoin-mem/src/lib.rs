#![forbid(unsafe_code)]
//! spilljoin-mem: hard memory budgeting, pooled frames, and run files.
//!
//! This crate provides concrete implementations for the *interfaces* defined
//! in `spilljoin-core::budget`. Every byte the join keeps resident for its
//! right-side window flows through a `FramePool` so the frame budget is a
//! hard ceiling enforced with RAII guards.
//!
//! No object-store IO lives here. A generic `Storage` trait is exposed
//! (in `spill::`) and implemented by `spilljoin-io`.

pub mod error;
pub mod guard;
pub mod pool;
pub mod spill;
pub mod tracking;
pub mod tuple_buffer;

pub use error::{Error, Result};
pub use guard::{BudgetGuardImpl, MemoryBudgetImpl};
pub use pool::{FramePool, PooledFrame};
pub use spill::{Codec, RunFileHandle, RunFileReader, RunFileWriter, Storage};
pub use tuple_buffer::{DeletableTupleBuffer, TuplePointer};
