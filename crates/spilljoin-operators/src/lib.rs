#![forbid(unsafe_code)]
//! spilljoin-operators: the merge join operator and its output plumbing.
//!
//! Design intent:
//! - Synchronous; each input branch is fed from its own thread.
//! - The right-side window is the only large allocation and lives in a
//!   budgeted `spilljoin-mem` buffer. Left tuples overflow to run files.

pub mod appender;
pub mod join;
pub mod traits;

pub use appender::{CollectingWriter, FrameTupleAppender};
pub use traits::{FrameWriter, OpError};
