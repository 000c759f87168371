//! Convenient re-exports for downstream crates.

pub use crate::config::JoinConfig;
pub use crate::error::{Error, Result};
pub use crate::frame::{Frame, FrameTupleAccessor};
pub use crate::id::{PartitionId, SpillId};
pub use crate::schema::{DataType, Field, Schema};
pub use crate::types::{Scalar, Tuple};
