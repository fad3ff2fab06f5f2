//! Transport trait definitions

use async_trait::async_trait;
use std::net::SocketAddr;

use crate::error::Result;

/// Events that can occur on a session transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Connection established
    Connected,
    /// Connection closed (clean or error)
    Disconnected { reason: Option<String> },
    /// Text frame received
    Text(String),
    /// Error occurred
    Error(String),
}

/// Trait for sending frames on a session
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Send a text frame
    async fn send(&self, text: String) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Close the sender
    async fn close(&self) -> Result<()>;
}

/// Trait for receiving frames on a session
#[async_trait]
pub trait TransportReceiver: Send {
    /// Receive the next event
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// Client side of a session transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// The sender type for this transport
    type Sender: TransportSender;
    /// The receiver type for this transport
    type Receiver: TransportReceiver;

    /// Connect to a remote endpoint
    async fn connect(addr: &str) -> Result<(Self::Sender, Self::Receiver)>
    where
        Self: Sized;
}

/// An accepted connection whose protocol handshake has not run yet.
///
/// Servers hand these out without waiting on the peer so one slow or idle
/// client cannot hold up the accept loop.
#[async_trait]
pub trait PendingConnection: Send + Sized + 'static {
    /// The sender type once established
    type Sender: TransportSender + 'static;
    /// The receiver type once established
    type Receiver: TransportReceiver + 'static;

    /// Complete the handshake
    async fn establish(self) -> Result<(Self::Sender, Self::Receiver)>;
}

/// Trait for session transport servers (listeners)
#[async_trait]
pub trait TransportServer: Send + Sync {
    /// Connection type produced by `accept`
    type Pending: PendingConnection;

    /// Accept a new connection
    async fn accept(&mut self) -> Result<(Self::Pending, SocketAddr)>;

    /// Get the local address
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Close the server
    async fn close(&self) -> Result<()>;
}

/// Non-blocking, connectionless datagram output.
///
/// `try_send_to` must never wait on the network: when the socket is not
/// writable it returns `ErrorKind::WouldBlock` and the datagram is lost.
pub trait DatagramSink: Send + Sync {
    /// Attempt to send one datagram to `target`
    fn try_send_to(&self, data: &[u8], target: SocketAddr) -> std::io::Result<usize>;

    /// Local address the datagrams leave from
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}
