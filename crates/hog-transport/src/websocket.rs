//! WebSocket transport implementation
//!
//! Touch clients speak JSON over text frames. Each accepted connection is
//! split into a writer task fed by a bounded channel and a reader task that
//! turns frames into [`TransportEvent`]s.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        handshake::server::{Request as HsRequest, Response as HsResponse},
        http::HeaderValue,
        protocol::Message as WsMessage,
    },
    WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{
    PendingConnection, Transport, TransportEvent, TransportReceiver, TransportSender,
    TransportServer,
};

/// WebSocket configuration
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Subprotocol echoed back when a client requests it. Browser clients
    /// usually request none.
    pub subprotocol: Option<String>,
    /// Capacity of the per-connection outbound and event channels
    pub channel_capacity: usize,
    /// Upper bound on the opening handshake of an accepted connection
    pub handshake_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            subprotocol: None,
            channel_capacity: 100,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// WebSocket client transport
pub struct WebSocketTransport;

/// WebSocket sender
pub struct WebSocketSender {
    tx: mpsc::Sender<WsMessage>,
    connected: Arc<Mutex<bool>>,
}

#[async_trait]
impl TransportSender for WebSocketSender {
    async fn send(&self, text: String) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        self.tx
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        let _ = self.tx.send(WsMessage::Close(None)).await;
        *self.connected.lock() = false;
        Ok(())
    }
}

/// WebSocket receiver
pub struct WebSocketReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

/// Split a handshaken stream into a sender and a receiver backed by tasks
fn spawn_io<S>(
    ws_stream: WebSocketStream<S>,
    capacity: usize,
) -> (WebSocketSender, WebSocketReceiver)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut write, mut read) = ws_stream.split();

    let (send_tx, mut send_rx) = mpsc::channel::<WsMessage>(capacity);
    let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(capacity);

    let connected = Arc::new(Mutex::new(true));
    let connected_write = connected.clone();
    let connected_read = connected.clone();

    // Writer task
    tokio::spawn(async move {
        while let Some(msg) = send_rx.recv().await {
            let closing = matches!(msg, WsMessage::Close(_));
            if let Err(e) = write.send(msg).await {
                debug!("WebSocket write error: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
        *connected_write.lock() = false;
    });

    // Reader task
    tokio::spawn(async move {
        let _ = event_tx.send(TransportEvent::Connected).await;

        while let Some(result) = read.next().await {
            match result {
                Ok(WsMessage::Text(text)) => {
                    if event_tx.send(TransportEvent::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(WsMessage::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => {
                        if event_tx.send(TransportEvent::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => warn!("Dropping non UTF-8 binary frame"),
                },
                Ok(WsMessage::Close(frame)) => {
                    let reason = frame.map(|f| f.reason.to_string());
                    let _ = event_tx
                        .send(TransportEvent::Disconnected { reason })
                        .await;
                    break;
                }
                // Pongs are answered by tungstenite
                Ok(_) => {}
                Err(e) => {
                    error!("WebSocket read error: {}", e);
                    let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                    let _ = event_tx
                        .send(TransportEvent::Disconnected {
                            reason: Some(e.to_string()),
                        })
                        .await;
                    break;
                }
            }
        }

        *connected_read.lock() = false;
    });

    let sender = WebSocketSender {
        tx: send_tx,
        connected,
    };
    let receiver = WebSocketReceiver { rx: event_rx };

    (sender, receiver)
}

#[async_trait]
impl Transport for WebSocketTransport {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn connect(url: &str) -> Result<(Self::Sender, Self::Receiver)> {
        info!("Connecting to WebSocket: {}", url);

        let (ws_stream, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("WebSocket connected, response: {:?}", response.status());

        Ok(spawn_io(ws_stream, WebSocketConfig::default().channel_capacity))
    }
}

/// WebSocket server
pub struct WebSocketServer {
    listener: tokio::net::TcpListener,
    config: WebSocketConfig,
}

impl WebSocketServer {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed(format!("{}: {}", addr, e)))?;

        info!("WebSocket server listening on {}", addr);

        Ok(Self {
            listener,
            config: WebSocketConfig::default(),
        })
    }

    pub fn with_config(mut self, config: WebSocketConfig) -> Self {
        self.config = config;
        self
    }
}

/// Accepted TCP stream awaiting its WebSocket handshake
pub struct WebSocketPending {
    stream: tokio::net::TcpStream,
    addr: SocketAddr,
    config: WebSocketConfig,
}

impl WebSocketPending {
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl PendingConnection for WebSocketPending {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn establish(self) -> Result<(Self::Sender, Self::Receiver)> {
        let addr = self.addr;
        let subprotocol = self.config.subprotocol.clone();
        let handshake = tokio_tungstenite::accept_hdr_async(
            self.stream,
            move |req: &HsRequest, mut response: HsResponse| {
                if let Some(subprotocol) = subprotocol {
                    let requested = req
                        .headers()
                        .get("Sec-WebSocket-Protocol")
                        .and_then(|v| v.to_str().ok())
                        .map(|v| v.split(',').any(|p| p.trim() == subprotocol))
                        .unwrap_or(false);
                    if requested {
                        if let Ok(value) = HeaderValue::from_str(&subprotocol) {
                            response
                                .headers_mut()
                                .insert("Sec-WebSocket-Protocol", value);
                        }
                    }
                }
                Ok(response)
            },
        );

        let ws_stream = tokio::time::timeout(self.config.handshake_timeout, handshake)
            .await
            .map_err(|_| {
                TransportError::ConnectionFailed(format!("{}: handshake timed out", addr))
            })?
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", addr, e)))?;

        info!("WebSocket client connected from {}", addr);

        Ok(spawn_io(ws_stream, self.config.channel_capacity))
    }
}

#[async_trait]
impl TransportServer for WebSocketServer {
    type Pending = WebSocketPending;

    async fn accept(&mut self) -> Result<(Self::Pending, SocketAddr)> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("Accepted TCP connection from {}", addr);

        let pending = WebSocketPending {
            stream,
            addr,
            config: self.config.clone(),
        };
        Ok((pending, addr))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(TransportError::Io)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_config_defaults() {
        let config = WebSocketConfig::default();
        assert!(config.subprotocol.is_none());
        assert_eq!(config.channel_capacity, 100);
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_text_frames_both_ways() {
        let mut server = WebSocketServer::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (pending, _) = server.accept().await.unwrap();
            pending.establish().await.unwrap()
        });

        let (client_tx, mut client_rx) =
            WebSocketTransport::connect(&format!("ws://{}", addr)).await.unwrap();
        let (server_tx, mut server_rx) = accept.await.unwrap();

        assert!(matches!(server_rx.recv().await, Some(TransportEvent::Connected)));
        assert!(matches!(client_rx.recv().await, Some(TransportEvent::Connected)));

        client_tx.send("{\"type\":\"ping\"}".to_string()).await.unwrap();
        match server_rx.recv().await {
            Some(TransportEvent::Text(text)) => assert_eq!(text, "{\"type\":\"ping\"}"),
            other => panic!("Expected text, got {:?}", other),
        }

        server_tx.send("pong".to_string()).await.unwrap();
        match client_rx.recv().await {
            Some(TransportEvent::Text(text)) => assert_eq!(text, "pong"),
            other => panic!("Expected text, got {:?}", other),
        }

        client_tx.close().await.unwrap();
        assert!(!client_tx.is_connected());
        assert!(matches!(
            server_rx.recv().await,
            Some(TransportEvent::Disconnected { .. })
        ));
    }

    #[tokio::test]
    async fn test_silent_peer_handshake_times_out() {
        let config = WebSocketConfig {
            handshake_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let mut server = WebSocketServer::bind("127.0.0.1:0")
            .await
            .unwrap()
            .with_config(config);
        let addr = server.local_addr().unwrap();

        // Plain TCP, never sends an upgrade request
        let _idle = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (pending, peer) = server.accept().await.unwrap();
        assert_eq!(pending.peer_addr(), peer);

        let result = tokio::time::timeout(Duration::from_secs(2), pending.establish())
            .await
            .expect("handshake should give up on its own");
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }
}
