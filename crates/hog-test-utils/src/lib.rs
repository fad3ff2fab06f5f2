//! Common test helpers and utilities for Hog bridge tests
//!
//! This crate provides:
//! - Condition-based waiting (no hardcoded sleeps)
//! - A test bridge with RAII cleanup
//! - A UDP capture socket standing in for the console
//! - A WebSocket client that speaks envelopes and notices
//! - Datagram sinks that fail on demand

use hog_core::{Envelope, Notice, OscMessage};
use hog_relay::{ManagerConfig, RelayCore, RelayTarget, SessionManager};
use hog_transport::{
    DatagramSink, OscSocket, Transport, TransportEvent, TransportReceiver, TransportSender,
    WebSocketReceiver, WebSocketSender, WebSocketTransport,
};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Port Allocation
// ============================================================================

/// Find an available TCP port for testing
pub async fn find_available_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

// ============================================================================
// UDP Capture - stands in for the console
// ============================================================================

/// Loopback UDP socket that decodes every datagram it receives as OSC
pub struct UdpCapture {
    socket: UdpSocket,
}

impl UdpCapture {
    pub async fn bind() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        Self { socket }
    }

    pub fn addr(&self) -> SocketAddr {
        self.socket.local_addr().unwrap()
    }

    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// Receive the next OSC message, or None on timeout
    pub async fn recv(&self, max_wait: Duration) -> Option<OscMessage> {
        let mut buf = vec![0u8; 65536];
        let (len, _) = timeout(max_wait, self.socket.recv_from(&mut buf))
            .await
            .ok()?
            .ok()?;
        OscMessage::from_bytes(&buf[..len]).ok()
    }

    /// Receive up to `n` messages, stopping early on timeout
    pub async fn recv_n(&self, n: usize, max_wait: Duration) -> Vec<OscMessage> {
        let deadline = Instant::now() + max_wait;
        let mut messages = Vec::with_capacity(n);
        while messages.len() < n {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.recv(remaining).await {
                Some(message) => messages.push(message),
                None => break,
            }
        }
        messages
    }

    /// Collect everything that arrives within `window`
    pub async fn drain(&self, window: Duration) -> Vec<OscMessage> {
        let deadline = Instant::now() + window;
        let mut messages = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            if let Some(message) = self.recv(remaining).await {
                messages.push(message);
            }
        }
        messages
    }
}

// ============================================================================
// Failing Sink
// ============================================================================

/// Datagram sink that fails every send with the given error kind
pub struct FailingSink {
    kind: io::ErrorKind,
    attempts: AtomicU32,
}

impl FailingSink {
    pub fn new(kind: io::ErrorKind) -> Self {
        Self {
            kind,
            attempts: AtomicU32::new(0),
        }
    }

    /// Number of sends attempted so far
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl DatagramSink for FailingSink {
    fn try_send_to(&self, _data: &[u8], _target: SocketAddr) -> io::Result<usize> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(io::Error::new(self.kind, "simulated send failure"))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::from(([127, 0, 0, 1], 0)))
    }
}

// ============================================================================
// Test Bridge - RAII wrapper with proper cleanup
// ============================================================================

/// A running bridge that automatically stops on drop
pub struct TestBridge {
    port: u16,
    relay: Arc<RelayCore>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestBridge {
    /// Start a bridge relaying to `target` over a real UDP socket
    pub async fn start(target: SocketAddr) -> Self {
        let socket = OscSocket::bind("127.0.0.1:0").await.unwrap();
        Self::start_with(ManagerConfig::default(), Arc::new(socket), target).await
    }

    /// Start a bridge with custom configuration and datagram sink
    pub async fn start_with(
        config: ManagerConfig,
        sink: Arc<dyn DatagramSink>,
        target: SocketAddr,
    ) -> Self {
        let relay = Arc::new(RelayCore::with_resolved(
            sink,
            RelayTarget::new(target.ip().to_string(), target.port()),
            Some(target),
        ));

        let port = find_available_port().await;
        let addr = format!("127.0.0.1:{}", port);
        let manager = SessionManager::new(config, Arc::clone(&relay));

        let handle = tokio::spawn(async move {
            let _ = manager.serve_websocket(&addr).await;
        });

        // Wait until the listener accepts connections
        let _ = wait_for(
            || async move {
                tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port))
                    .await
                    .is_ok()
            },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await;

        Self {
            port,
            relay,
            handle: Some(handle),
        }
    }

    /// Get the WebSocket URL for this bridge
    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn relay(&self) -> &Arc<RelayCore> {
        &self.relay
    }

    /// Connect a client and consume its hello
    pub async fn connect(&self) -> TestClient {
        let mut client = TestClient::connect(&self.url()).await;
        match client.recv_notice(DEFAULT_TIMEOUT).await {
            Some(Notice::Hello { .. }) => {}
            other => panic!("Expected hello, got {:?}", other),
        }
        client
    }

    /// Wait until the bridge has exactly `n` registered sessions
    pub async fn wait_for_sessions(&self, n: usize) -> bool {
        let relay = Arc::clone(&self.relay);
        wait_for(
            || {
                let relay = Arc::clone(&relay);
                async move { relay.session_count() == n }
            },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await
    }

    /// Stop the bridge explicitly (also happens on drop)
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for TestBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Test Client
// ============================================================================

/// WebSocket client that sends envelopes and reads notices
pub struct TestClient {
    sender: WebSocketSender,
    receiver: WebSocketReceiver,
}

impl TestClient {
    pub async fn connect(url: &str) -> Self {
        let (sender, receiver) = WebSocketTransport::connect(url).await.unwrap();
        Self { sender, receiver }
    }

    /// Send a raw text frame
    pub async fn send_text(&self, text: &str) {
        self.sender.send(text.to_string()).await.unwrap();
    }

    /// Send an envelope as JSON
    pub async fn send(&self, envelope: &Envelope) {
        let text = serde_json::to_string(envelope).unwrap();
        self.send_text(&text).await;
    }

    /// Next notice, skipping transport lifecycle events. None on timeout or close.
    pub async fn recv_notice(&mut self, max_wait: Duration) -> Option<Notice> {
        let deadline = Instant::now() + max_wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.receiver.recv()).await.ok()?? {
                TransportEvent::Text(text) => return Notice::parse(&text).ok(),
                TransportEvent::Connected => continue,
                TransportEvent::Disconnected { .. } | TransportEvent::Error(_) => return None,
            }
        }
    }

    /// True once the server has closed this connection
    pub async fn wait_closed(&mut self, max_wait: Duration) -> bool {
        let deadline = Instant::now() + max_wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.receiver.recv()).await {
                Err(_) => return false,
                Ok(None) | Ok(Some(TransportEvent::Disconnected { .. })) => return true,
                Ok(Some(_)) => continue,
            }
        }
    }

    pub async fn close(&self) {
        let _ = self.sender.close().await;
    }
}
