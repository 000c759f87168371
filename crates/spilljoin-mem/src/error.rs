use thiserror::Error;

/// Result type local to spilljoin-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("memory budget exceeded for tag '{tag}': requested {requested} bytes, capacity {capacity}, used {used}")]
    BudgetExceeded {
        tag: &'static str,
        requested: usize,
        capacity: usize,
        used: usize,
    },

    #[error("memory budget error: {0}")]
    Budget(String),

    #[error("invalid memory configuration: {0}")]
    Config(String),

    #[error("spill storage error: {0}")]
    Storage(String),

    #[error("unsupported codec: {0}")]
    CodecUnsupported(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("checksum mismatch in run file '{path}' at offset {offset}")]
    ChecksumMismatch { path: String, offset: u64 },

    #[error("stale or invalid tuple pointer {0}")]
    InvalidPointer(String),

    #[error("tuple of {tuple_bytes} bytes cannot fit a {frame_size}-byte frame")]
    TupleTooLarge { tuple_bytes: usize, frame_size: usize },
}

impl From<spilljoin_core::error::Error> for Error {
    fn from(e: spilljoin_core::error::Error) -> Self {
        match e {
            spilljoin_core::error::Error::Config(msg) => Error::Config(msg),
            spilljoin_core::error::Error::Schema(msg) => Error::Config(format!("schema: {msg}")),
        }
    }
}
