//! Error types for the Hog bridge core

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    /// Button key is empty or blank
    #[error("invalid button key: {0:?}")]
    InvalidKey(String),

    /// Control index outside the 1-based range
    #[error("invalid control index: {0}")]
    InvalidIndex(u32),

    /// A numeric field was NaN or infinite
    #[error("non-finite value for {field}")]
    NonFinite { field: &'static str },

    /// OSC packet encoding failed
    #[error("encode error: {0}")]
    Encode(String),

    /// OSC packet decoding failed
    #[error("decode error: {0}")]
    Decode(String),

    /// Envelope (de)serialization failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
