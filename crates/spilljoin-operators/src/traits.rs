//! Error type and the output-sink trait shared by the operators.

use spilljoin_core::frame::Frame;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("run file error: {0}")]
    Spill(#[from] spilljoin_mem::Error),

    #[error("predicate error: {0}")]
    Predicate(String),

    #[error("execution error: {0}")]
    Exec(String),

    #[error("join aborted")]
    Aborted,
}

impl From<spilljoin_core::error::Error> for OpError {
    fn from(e: spilljoin_core::error::Error) -> Self {
        use spilljoin_core::error::Error as CoreError;
        match e {
            CoreError::Config(msg) => OpError::Config(msg),
            CoreError::Schema(msg) => OpError::Config(format!("schema: {msg}")),
        }
    }
}

/// Downstream consumer of result frames.
pub trait FrameWriter {
    fn next_frame(&mut self, frame: &Frame) -> Result<(), OpError>;
}

impl<W: FrameWriter + ?Sized> FrameWriter for &mut W {
    fn next_frame(&mut self, frame: &Frame) -> Result<(), OpError> {
        (**self).next_frame(frame)
    }
}
