//! Streaming readers that produce frames bounded by the configured frame size.

pub mod csv;
