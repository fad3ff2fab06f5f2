//! Relay Core
//!
//! Owns the single live OSC destination and the table of open sessions.
//! Sends are fire-and-forget on a non-blocking datagram sink; a send fault is
//! reported to every open session as an `osc_error` notice.

use dashmap::DashMap;
use hog_core::{Notice, OscMessage};
use hog_transport::DatagramSink;
use parking_lot::RwLock;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{RelayError, Result};
use crate::session::{Session, SessionId};

/// OSC destination as configured by a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayTarget {
    pub host: String,
    pub port: u16,
}

impl RelayTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for RelayTarget {
    fn default() -> Self {
        Self::new(hog_core::DEFAULT_OSC_HOST, hog_core::DEFAULT_OSC_PORT)
    }
}

impl fmt::Display for RelayTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Immutable snapshot of the live target and its resolved address
#[derive(Debug, Clone)]
struct LiveTarget {
    target: RelayTarget,
    addr: Option<SocketAddr>,
    /// Order of the request that installed this target
    generation: u64,
}

/// A validated target change waiting for its address lookup.
///
/// Created by [`RelayCore::prepare`] in request order; a ticket only takes
/// effect if no later ticket has been committed first.
#[derive(Debug)]
pub struct Reconfigure {
    target: RelayTarget,
    generation: u64,
}

impl Reconfigure {
    pub fn target(&self) -> &RelayTarget {
        &self.target
    }
}

/// Validate a client-supplied host and port
pub fn validate_target(host: &str, port: i64) -> Result<RelayTarget> {
    let host = host.trim();
    if host.is_empty() {
        return Err(RelayError::InvalidTarget("host must not be empty".to_string()));
    }
    if !(1..=65535).contains(&port) {
        return Err(RelayError::InvalidTarget(format!(
            "port {} out of range 1-65535",
            port
        )));
    }
    Ok(RelayTarget::new(host, port as u16))
}

/// Relay core shared by every session
pub struct RelayCore {
    target: RwLock<Arc<LiveTarget>>,
    generation: AtomicU64,
    sink: Arc<dyn DatagramSink>,
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl RelayCore {
    /// Create a relay, resolving the initial target
    pub async fn new(sink: Arc<dyn DatagramSink>, target: RelayTarget) -> Self {
        let addr = resolve(sink.as_ref(), &target).await;
        Self::with_resolved(sink, target, addr)
    }

    /// Create a relay with an already resolved target address
    pub fn with_resolved(
        sink: Arc<dyn DatagramSink>,
        target: RelayTarget,
        addr: Option<SocketAddr>,
    ) -> Self {
        info!("OSC target {} ({:?})", target, addr);
        Self {
            target: RwLock::new(Arc::new(LiveTarget {
                target,
                addr,
                generation: 0,
            })),
            generation: AtomicU64::new(0),
            sink,
            sessions: DashMap::new(),
        }
    }

    /// Current target
    pub fn target(&self) -> RelayTarget {
        self.target.read().target.clone()
    }

    /// Resolved address of the current target, if resolution succeeded
    pub fn target_addr(&self) -> Option<SocketAddr> {
        self.target.read().addr
    }

    /// Send one OSC message as one datagram to the current target.
    ///
    /// Never fails from the caller's point of view. A full socket buffer drops
    /// the datagram; any other fault is broadcast to all sessions.
    pub fn send(&self, message: &OscMessage) {
        let live = self.target.read().clone();

        let data = match message.to_bytes() {
            Ok(data) => data,
            Err(e) => {
                warn!("Dropping unencodable OSC message {}: {}", message.address, e);
                return;
            }
        };

        let Some(addr) = live.addr else {
            let err = io::Error::new(
                io::ErrorKind::NotFound,
                format!("could not resolve {}", live.target.host),
            );
            self.on_transport_error(&live.target, &err);
            return;
        };

        match self.sink.try_send_to(&data, addr) {
            Ok(_) => {
                debug!("OSC -> {} {}", live.target, message.to_json());
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!("Socket busy, dropped {}", message.address);
            }
            Err(e) => {
                self.on_transport_error(&live.target, &e);
            }
        }
    }

    /// Validate, resolve and swap in a new target.
    ///
    /// Invalid input leaves the live target untouched. A host that fails to
    /// resolve is still accepted; sends to it report `osc_error`.
    pub async fn reconfigure(&self, host: &str, port: i64) -> Result<RelayTarget> {
        let ticket = self.prepare(host, port)?;
        self.complete(ticket).await
    }

    /// Validate a target change and fix its place in request order.
    ///
    /// Does not wait, so callers can order requests on their own task and
    /// leave the lookup to [`complete`](Self::complete).
    pub fn prepare(&self, host: &str, port: i64) -> Result<Reconfigure> {
        let target = validate_target(host, port)?;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        Ok(Reconfigure { target, generation })
    }

    /// Resolve a prepared target and swap it in, unless a later request
    /// already took effect.
    pub async fn complete(&self, ticket: Reconfigure) -> Result<RelayTarget> {
        let addr = resolve(self.sink.as_ref(), &ticket.target).await;
        self.commit(ticket, addr)
    }

    fn commit(&self, ticket: Reconfigure, addr: Option<SocketAddr>) -> Result<RelayTarget> {
        let mut live = self.target.write();
        if live.generation > ticket.generation {
            debug!(
                "Discarding target {}, superseded by {}",
                ticket.target, live.target
            );
            return Err(RelayError::Superseded(ticket.target.to_string()));
        }

        *live = Arc::new(LiveTarget {
            target: ticket.target.clone(),
            addr,
            generation: ticket.generation,
        });
        drop(live);

        info!("OSC target reconfigured to {} ({:?})", ticket.target, addr);
        Ok(ticket.target)
    }

    /// Report a send fault on `target` to every open session
    pub fn on_transport_error(&self, target: &RelayTarget, err: &io::Error) -> usize {
        error!("OSC send to {} failed: {}", target, err);

        let notice = Notice::OscError {
            message: err.to_string(),
            code: Some(format!("{:?}", err.kind())),
            host: target.host.clone(),
            port: target.port,
        };
        self.broadcast(&notice)
    }

    /// Add a session to the broadcast table
    pub fn register(&self, session: Arc<Session>) {
        debug!("Registered session {}", session.id);
        self.sessions.insert(session.id.clone(), session);
    }

    /// Remove a session from the broadcast table
    pub fn deregister(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, s)| s)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Queue a notice on every open session, returning how many accepted it
    pub fn broadcast(&self, notice: &Notice) -> usize {
        let mut delivered = 0;
        for entry in self.sessions.iter() {
            if entry.value().notify(notice.clone()) {
                delivered += 1;
            }
        }
        delivered
    }
}

/// Resolve a target, preferring the address family of the sink
async fn resolve(sink: &dyn DatagramSink, target: &RelayTarget) -> Option<SocketAddr> {
    let addrs: Vec<SocketAddr> =
        match tokio::net::lookup_host((target.host.as_str(), target.port)).await {
            Ok(addrs) => addrs.collect(),
            Err(e) => {
                warn!("Failed to resolve {}: {}", target, e);
                return None;
            }
        };

    let want_v4 = sink.local_addr().map(|a| a.is_ipv4()).unwrap_or(true);
    addrs
        .iter()
        .find(|a| a.is_ipv4() == want_v4)
        .or_else(|| addrs.first())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Sink that records datagrams, or fails every send with `fail`
    struct MockSink {
        sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
        fail: Option<io::ErrorKind>,
    }

    impl MockSink {
        fn new(fail: Option<io::ErrorKind>) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    impl DatagramSink for MockSink {
        fn try_send_to(&self, data: &[u8], target: SocketAddr) -> io::Result<usize> {
            if let Some(kind) = self.fail {
                return Err(io::Error::new(kind, "mock failure"));
            }
            self.sent.lock().push((data.to_vec(), target));
            Ok(data.len())
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok("127.0.0.1:50000".parse().unwrap())
        }
    }

    fn relay_with(sink: Arc<MockSink>) -> RelayCore {
        let addr = "127.0.0.1:6600".parse().ok();
        RelayCore::with_resolved(sink, RelayTarget::default(), addr)
    }

    #[test]
    fn test_validate_target() {
        assert_eq!(
            validate_target("  10.0.0.5 ", 7000).unwrap(),
            RelayTarget::new("10.0.0.5", 7000)
        );
        assert!(validate_target("", 7000).is_err());
        assert!(validate_target("   ", 7000).is_err());
        assert!(validate_target("host", 0).is_err());
        assert!(validate_target("host", 70000).is_err());
        assert!(validate_target("host", -1).is_err());
        assert!(validate_target("host", 65535).is_ok());
    }

    #[test]
    fn test_send_encodes_one_datagram() {
        let sink = MockSink::new(None);
        let relay = relay_with(sink.clone());

        relay.send(&OscMessage::float("/hog/hardware/go", 1.0));

        let sent = sink.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "127.0.0.1:6600".parse::<SocketAddr>().unwrap());
        let decoded = OscMessage::from_bytes(&sent[0].0).unwrap();
        assert_eq!(decoded.address, "/hog/hardware/go");
    }

    #[test]
    fn test_would_block_is_silent() {
        let relay = relay_with(MockSink::new(Some(io::ErrorKind::WouldBlock)));
        let (session, mut rx) = Session::channel("127.0.0.1:1".parse().unwrap(), 8);
        relay.register(Arc::new(session));

        relay.send(&OscMessage::float("/hog/hardware/go", 1.0));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_fault_broadcasts_osc_error() {
        let relay = relay_with(MockSink::new(Some(io::ErrorKind::ConnectionRefused)));
        let (a, mut rx_a) = Session::channel("127.0.0.1:1".parse().unwrap(), 8);
        let (b, mut rx_b) = Session::channel("127.0.0.1:2".parse().unwrap(), 8);
        relay.register(Arc::new(a));
        relay.register(Arc::new(b));

        relay.send(&OscMessage::float("/hog/hardware/go", 1.0));

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.try_recv().unwrap() {
                Notice::OscError {
                    code, host, port, ..
                } => {
                    assert_eq!(code.as_deref(), Some("ConnectionRefused"));
                    assert_eq!(host, "127.0.0.1");
                    assert_eq!(port, 6600);
                }
                other => panic!("Expected osc_error, got {:?}", other),
            }
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn test_closed_session_skipped() {
        let relay = relay_with(MockSink::new(None));
        let (open, _rx_open) = Session::channel("127.0.0.1:1".parse().unwrap(), 8);
        let (closed, rx_closed) = Session::channel("127.0.0.1:2".parse().unwrap(), 8);
        drop(rx_closed);
        relay.register(Arc::new(open));
        relay.register(Arc::new(closed));

        let notice = Notice::Hello {
            message: "hi".to_string(),
        };
        assert_eq!(relay.broadcast(&notice), 1);
    }

    #[test]
    fn test_unresolved_target_reports_error() {
        let sink = MockSink::new(None);
        let relay =
            RelayCore::with_resolved(sink.clone(), RelayTarget::new("console.invalid", 6600), None);
        let (session, mut rx) = Session::channel("127.0.0.1:1".parse().unwrap(), 8);
        relay.register(Arc::new(session));

        relay.send(&OscMessage::float("/hog/hardware/go", 1.0));

        assert!(sink.sent.lock().is_empty());
        assert!(matches!(
            rx.try_recv().unwrap(),
            Notice::OscError { code: Some(ref c), .. } if c == "NotFound"
        ));
    }

    #[tokio::test]
    async fn test_reconfigure_swaps_target() {
        let sink = MockSink::new(None);
        let relay = relay_with(sink.clone());

        let target = relay.reconfigure("127.0.0.1", 7001).await.unwrap();
        assert_eq!(target, RelayTarget::new("127.0.0.1", 7001));
        assert_eq!(relay.target_addr(), "127.0.0.1:7001".parse::<SocketAddr>().ok());

        relay.send(&OscMessage::float("/hog/hardware/go", 0.0));
        assert_eq!(sink.sent.lock()[0].1.port(), 7001);
    }

    #[tokio::test]
    async fn test_invalid_reconfigure_keeps_target() {
        let relay = relay_with(MockSink::new(None));
        let before = relay.target();

        assert!(relay.reconfigure("", 7000).await.is_err());
        assert!(relay.reconfigure("10.0.0.1", 0).await.is_err());
        assert!(relay.reconfigure("10.0.0.1", 65536).await.is_err());

        assert_eq!(relay.target(), before);
        assert_eq!(relay.target_addr(), "127.0.0.1:6600".parse::<SocketAddr>().ok());
    }

    #[test]
    fn test_stale_lookup_does_not_overwrite_newer_target() {
        let sink = MockSink::new(None);
        let relay = relay_with(sink.clone());

        let first = relay.prepare("127.0.0.1", 7001).unwrap();
        let second = relay.prepare("127.0.0.2", 7002).unwrap();

        // The second lookup finishes first
        let b = "127.0.0.2:7002".parse::<SocketAddr>().ok();
        assert_eq!(relay.commit(second, b).unwrap(), RelayTarget::new("127.0.0.2", 7002));

        let a = "127.0.0.1:7001".parse::<SocketAddr>().ok();
        assert!(matches!(
            relay.commit(first, a),
            Err(RelayError::Superseded(_))
        ));

        assert_eq!(relay.target(), RelayTarget::new("127.0.0.2", 7002));
        assert_eq!(relay.target_addr(), b);

        relay.send(&OscMessage::float("/hog/hardware/go", 1.0));
        assert_eq!(Some(sink.sent.lock()[0].1), b);
    }

    #[test]
    fn test_rejected_prepare_consumes_no_order() {
        let relay = relay_with(MockSink::new(None));
        assert!(relay.prepare("", 7000).is_err());

        let ticket = relay.prepare("127.0.0.1", 7001).unwrap();
        assert_eq!(ticket.target(), &RelayTarget::new("127.0.0.1", 7001));
        assert_eq!(ticket.generation, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sends_never_see_a_torn_target() {
        let a = "127.0.0.1:7001".parse::<SocketAddr>().unwrap();
        let b = "127.0.0.2:7002".parse::<SocketAddr>().unwrap();

        let sink = MockSink::new(None);
        let relay = Arc::new(RelayCore::with_resolved(
            sink.clone(),
            RelayTarget::new("127.0.0.1", 7001),
            Some(a),
        ));

        let mut senders = Vec::new();
        for _ in 0..3 {
            let relay = Arc::clone(&relay);
            senders.push(tokio::spawn(async move {
                for _ in 0..500 {
                    relay.send(&OscMessage::float("/hog/hardware/go", 1.0));
                    tokio::task::yield_now().await;
                }
            }));
        }

        let switcher = {
            let relay = Arc::clone(&relay);
            tokio::spawn(async move {
                for i in 0..200 {
                    let (host, port) = if i % 2 == 0 {
                        ("127.0.0.2", 7002)
                    } else {
                        ("127.0.0.1", 7001)
                    };
                    relay.reconfigure(host, port).await.unwrap();
                }
            })
        };

        for task in senders {
            task.await.unwrap();
        }
        switcher.await.unwrap();

        let sent = sink.sent.lock();
        assert_eq!(sent.len(), 1500);
        for (_, addr) in sent.iter() {
            assert!(*addr == a || *addr == b, "unexpected destination {}", addr);
        }
    }
}
