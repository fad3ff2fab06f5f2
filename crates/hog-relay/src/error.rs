//! Relay error types

use thiserror::Error;

use hog_core::ControlKind;

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("invalid OSC target: {0}")]
    InvalidTarget(String),

    #[error("OSC target {0} superseded by a later request")]
    Superseded(String),

    #[error("control error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("core protocol error: {0}")]
    Core(#[from] hog_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] hog_transport::TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Input rejected by the control state tracker
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    #[error("{input} input is not supported by {kind:?} controls")]
    Unsupported {
        input: &'static str,
        kind: ControlKind,
    },

    #[error("non-finite {field}")]
    NonFinite { field: &'static str },
}
