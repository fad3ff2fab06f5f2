//! Hog Core
//!
//! Core types and encoding for the Hog OSC bridge.
//!
//! This crate provides:
//! - The physical-control event model ([`ControlEvent`], [`ControlId`])
//! - The OSC address encoder ([`encoder`]) mapping events to console addresses
//! - OSC message types and wire encoding ([`OscMessage`], [`OscArg`])
//! - JSON session envelopes exchanged with touch clients ([`Envelope`], [`Notice`])

pub mod control;
pub mod encoder;
pub mod envelope;
pub mod error;
pub mod osc;

pub use control::{
    ButtonPhase, ControlEvent, ControlId, ControlKind, EncoderPhase, FaderPhase, PlaybackAction,
};
pub use encoder::{encode, encode_button, encode_playback};
pub use envelope::{Envelope, Notice};
pub use error::{Error, Result};
pub use osc::{OscArg, OscMessage};

/// Default WebSocket listen port for touch clients
pub const DEFAULT_WS_PORT: u16 = 8080;

/// Default OSC destination host, used until the first `osc_config`
pub const DEFAULT_OSC_HOST: &str = "127.0.0.1";

/// Default OSC destination port, used until the first `osc_config`
pub const DEFAULT_OSC_PORT: u16 = 6600;

/// Root of every hardware address on the console
pub const HARDWARE_PREFIX: &str = "/hog/hardware";

/// Scale applied to encoder deltas before they go on the wire
pub const ENCODER_DELTA_SCALE: f64 = 300.0;

/// Full-scale fader level on the wire
pub const FADER_SCALE: f64 = 255.0;

/// Greeting sent to every new session
pub const HELLO_MESSAGE: &str = "Connected to Hog OSC bridge";
