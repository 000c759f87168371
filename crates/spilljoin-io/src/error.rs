use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration: {0}")]
    Config(String),
}

impl From<spilljoin_core::error::Error> for Error {
    fn from(e: spilljoin_core::error::Error) -> Self {
        Error::Config(e.to_string())
    }
}
