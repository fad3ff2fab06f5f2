//! UDP datagram output for OSC

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::info;

use crate::error::{Result, TransportError};
use crate::traits::DatagramSink;

/// UDP configuration
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Local address to send from. Port 0 picks an ephemeral port.
    pub bind_addr: String,
    /// Maximum datagram size
    pub max_packet_size: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:0".to_string(),
            max_packet_size: 65507, // Max UDP payload
        }
    }
}

/// Send-only UDP socket for OSC datagrams
pub struct OscSocket {
    socket: Arc<UdpSocket>,
    config: UdpConfig,
}

impl OscSocket {
    /// Bind to a local address
    pub async fn bind(addr: &str) -> Result<Self> {
        Self::bind_with_config(UdpConfig {
            bind_addr: addr.to_string(),
            ..Default::default()
        })
        .await
    }

    /// Bind with config
    pub async fn bind_with_config(config: UdpConfig) -> Result<Self> {
        let socket = UdpSocket::bind(&config.bind_addr)
            .await
            .map_err(|e| TransportError::BindFailed(format!("{}: {}", config.bind_addr, e)))?;

        // Prime write readiness so the first try_send_to is not refused
        // before the reactor has seen the socket.
        socket.writable().await?;

        info!("OSC UDP socket bound to {}", socket.local_addr()?);

        Ok(Self {
            socket: Arc::new(socket),
            config,
        })
    }
}

impl DatagramSink for OscSocket {
    fn try_send_to(&self, data: &[u8], target: SocketAddr) -> io::Result<usize> {
        if data.len() > self.config.max_packet_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("datagram too large: {} bytes", data.len()),
            ));
        }
        self.socket.try_send_to(data, target)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
