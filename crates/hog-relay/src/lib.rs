//! Hog Relay
//!
//! The bridge between touch-client sessions and the console:
//! - Accepts and greets client sessions ([`SessionManager`])
//! - Tracks momentary control state per session ([`ControlTracker`])
//! - Sends OSC datagrams to the live console target ([`RelayCore`])
//! - Reports send faults to every open session
//!
//! # Example
//!
//! ```no_run
//! use hog_relay::{ManagerConfig, RelayCore, RelayTarget, SessionManager};
//! use hog_transport::OscSocket;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let socket = OscSocket::bind("0.0.0.0:0").await?;
//!     let relay = RelayCore::new(Arc::new(socket), RelayTarget::default()).await;
//!     let manager = SessionManager::new(ManagerConfig::default(), Arc::new(relay));
//!
//!     manager.serve_websocket("0.0.0.0:8080").await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod manager;
pub mod relay;
pub mod session;
pub mod tracker;

pub use error::{RelayError, Result, TrackerError};
pub use manager::{ManagerConfig, SessionManager};
pub use relay::{validate_target, Reconfigure, RelayCore, RelayTarget};
pub use session::{Session, SessionId};
pub use tracker::{ControlTracker, Input, TickKind, TimerTick, TrackerConfig};
