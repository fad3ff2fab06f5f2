//! Hog Bridge Transport Layer
//!
//! This crate provides the transports the bridge sits between:
//! - WebSocket (duplex sessions with touch clients)
//! - UDP (fire-and-forget OSC datagrams to the console)

pub mod error;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "udp")]
pub mod udp;

pub use error::{Result, TransportError};
pub use traits::{
    DatagramSink, PendingConnection, Transport, TransportEvent, TransportReceiver, TransportSender,
    TransportServer,
};

#[cfg(feature = "websocket")]
pub use websocket::{
    WebSocketConfig, WebSocketPending, WebSocketReceiver, WebSocketSender, WebSocketServer,
    WebSocketTransport,
};

#[cfg(feature = "udp")]
pub use udp::{OscSocket, UdpConfig};
