//! Session Manager
//!
//! Accepts touch-client sessions on any [`TransportServer`], greets them,
//! parses their JSON envelopes and drives each session's control tracker.
//! Control events leave through the shared [`RelayCore`].
//!
//! # Example
//!
//! ```no_run
//! use hog_relay::{ManagerConfig, RelayCore, RelayTarget, SessionManager};
//! use hog_transport::OscSocket;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let socket = OscSocket::bind("0.0.0.0:0").await?;
//! let relay = RelayCore::new(Arc::new(socket), RelayTarget::default()).await;
//! let manager = SessionManager::new(ManagerConfig::default(), Arc::new(relay));
//! manager.serve_websocket("0.0.0.0:8080").await?;
//! # Ok(())
//! # }
//! ```

use hog_core::{encode, encode_button, encode_playback, ControlEvent, ControlId, Envelope, Notice};
use hog_transport::{
    PendingConnection, TransportEvent, TransportReceiver, TransportSender, TransportServer,
};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[cfg(feature = "websocket")]
use hog_transport::WebSocketServer;

use crate::{
    error::{RelayError, Result},
    relay::{RelayCore, RelayTarget},
    session::Session,
    tracker::{ControlTracker, Input, TrackerConfig},
};

/// Session manager configuration
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Bridge name, used in logs
    pub name: String,
    /// Greeting sent to every new session
    pub hello_message: String,
    /// Maximum concurrent sessions
    pub max_sessions: usize,
    /// Capacity of each session's outbound notice queue
    pub notice_queue: usize,
    /// Gesture shaping for every session's tracker
    pub tracker: TrackerConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            name: "Hog OSC Bridge".to_string(),
            hello_message: hog_core::HELLO_MESSAGE.to_string(),
            max_sessions: 64,
            notice_queue: 64,
            tracker: TrackerConfig::default(),
        }
    }
}

/// Accepts sessions and dispatches their envelopes
pub struct SessionManager {
    config: ManagerConfig,
    relay: Arc<RelayCore>,
    /// Sessions holding a slot under `max_sessions`
    active: Arc<AtomicUsize>,
    /// Running flag
    running: Arc<RwLock<bool>>,
}

/// One reserved place under the session limit, given back on drop
struct SessionSlot(Arc<AtomicUsize>);

impl SessionSlot {
    fn reserve(active: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()
            .map(|_| Self(Arc::clone(active)))
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl SessionManager {
    pub fn new(config: ManagerConfig, relay: Arc<RelayCore>) -> Self {
        Self {
            config,
            relay,
            active: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Serve sessions from any TransportServer implementation
    pub async fn serve_on<S>(&self, mut server: S) -> Result<()>
    where
        S: TransportServer + 'static,
    {
        info!("{} accepting connections", self.config.name);
        *self.running.write() = true;

        while *self.running.read() {
            match server.accept().await {
                Ok((pending, addr)) => {
                    info!("New connection from {}", addr);
                    self.handle_connection(pending, addr);
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }

        server.close().await?;
        Ok(())
    }

    /// Serve sessions over WebSocket
    #[cfg(feature = "websocket")]
    pub async fn serve_websocket(&self, addr: &str) -> Result<()> {
        let server = WebSocketServer::bind(addr).await?;
        self.serve_on(server).await
    }

    /// Handshake and run one session to completion on its own task
    fn handle_connection(&self, pending: impl PendingConnection, addr: SocketAddr) {
        let relay = Arc::clone(&self.relay);
        let config = self.config.clone();
        let active = Arc::clone(&self.active);
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            let (sender, mut receiver) = match pending.establish().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("Handshake with {} failed: {}", addr, e);
                    return;
                }
            };
            let sender: Arc<dyn TransportSender> = Arc::new(sender);

            let Some(_slot) = SessionSlot::reserve(&active, config.max_sessions) else {
                warn!(
                    "Session limit {} reached, refusing {}",
                    config.max_sessions, addr
                );
                let _ = sender.close().await;
                return;
            };

            let (session, writer) =
                Session::spawn(Arc::clone(&sender), addr, config.notice_queue);

            // Greet before registering so no broadcast can overtake the hello
            session.notify(Notice::Hello {
                message: config.hello_message.clone(),
            });
            relay.register(Arc::clone(&session));
            info!("Session {} opened for {}", session.id, addr);

            let (mut tracker, mut ticks) = ControlTracker::new(config.tracker.clone());

            while *running.read() {
                tokio::select! {
                    event = receiver.recv() => match event {
                        Some(TransportEvent::Text(text)) => {
                            dispatch(&text, &session, &mut tracker, &relay);
                        }
                        Some(TransportEvent::Disconnected { reason }) => {
                            info!("Client {} disconnected: {:?}", addr, reason);
                            break;
                        }
                        Some(TransportEvent::Error(e)) => {
                            error!("Transport error from {}: {}", addr, e);
                            break;
                        }
                        Some(TransportEvent::Connected) => {}
                        None => break,
                    },
                    Some(tick) = ticks.recv() => {
                        for event in tracker.on_tick(tick) {
                            forward(&relay, &event);
                        }
                    }
                }
            }

            // Cleanup session
            info!("Removing session {}", session.id);
            relay.deregister(&session.id);
            session.mark_closed();
            for event in tracker.release_all() {
                forward(&relay, &event);
            }
            drop(tracker);
            writer.abort();
            let _ = sender.close().await;
        });
    }

    /// Stop accepting sessions
    pub fn stop(&self) {
        *self.running.write() = false;
    }

    /// Get session count
    pub fn session_count(&self) -> usize {
        self.relay.session_count()
    }

    pub fn relay(&self) -> &Arc<RelayCore> {
        &self.relay
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }
}

/// Handle one inbound text frame.
///
/// Never waits: target lookups run on their own task and reply when done, so
/// control frames and timer ticks behind an `osc_config` keep flowing.
fn dispatch(
    text: &str,
    session: &Arc<Session>,
    tracker: &mut ControlTracker,
    relay: &Arc<RelayCore>,
) {
    let envelope = match Envelope::parse(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Dropping malformed envelope from {}: {}", session.peer, e);
            return;
        }
    };
    debug!("Session {} <- {}", session.id, envelope.kind());

    match envelope {
        Envelope::OscConfig { host, port } => {
            // Order is fixed here, before any lookup starts
            let ticket = port_from_json(port).and_then(|port| relay.prepare(&host, port));
            let ticket = match ticket {
                Ok(ticket) => ticket,
                Err(e) => {
                    session.notify(config_reply(session, Err(e)));
                    return;
                }
            };

            let relay = Arc::clone(relay);
            let session = Arc::clone(session);
            tokio::spawn(async move {
                let result = relay.complete(ticket).await;
                session.notify(config_reply(&session, result));
            });
        }
        Envelope::Playback { playback, action } => {
            if playback == 0 {
                warn!("Dropping playback {} for index 0", action.as_str());
                return;
            }
            relay.send(&encode_playback(playback, action));
        }
        Envelope::Button { id } => {
            if id == 0 {
                warn!("Dropping button press for id 0");
                return;
            }
            relay.send(&encode_button(id));
        }
        other => {
            let events = control_input(&other)
                .map_err(RelayError::from)
                .and_then(|(id, input)| tracker.apply(id, input).map_err(RelayError::from));
            match events {
                Ok(events) => {
                    for event in &events {
                        forward(relay, event);
                    }
                }
                Err(e) => warn!("Dropping {} from {}: {}", other.kind(), session.peer, e),
            }
        }
    }
}

fn config_reply(session: &Session, result: Result<RelayTarget>) -> Notice {
    match result {
        Ok(target) => Notice::OscConfigOk {
            host: target.host,
            port: target.port,
        },
        Err(e) => {
            warn!("Rejected osc_config from {}: {}", session.peer, e);
            Notice::OscConfigError {
                message: e.to_string(),
            }
        }
    }
}

/// Encode a control event and relay every resulting message
fn forward(relay: &RelayCore, event: &ControlEvent) {
    for message in encode(event) {
        relay.send(&message);
    }
}

/// JSON numbers arrive as f64; ports must be finite integers
fn port_from_json(port: f64) -> Result<i64> {
    if !port.is_finite() || port.fract() != 0.0 {
        return Err(RelayError::InvalidTarget(format!(
            "port {} is not an integer",
            port
        )));
    }
    Ok(port as i64)
}

/// Map a control envelope to the tracker input it carries
fn control_input(envelope: &Envelope) -> hog_core::Result<(ControlId, Input)> {
    let mapped = match envelope {
        Envelope::ButtonStart { key } => (ControlId::button(key)?, Input::Start),
        Envelope::ButtonEnd { key } => (ControlId::button(key)?, Input::End),
        Envelope::EncoderStart { encoder } => (ControlId::encoder(*encoder)?, Input::Start),
        Envelope::EncoderEnd { encoder } => (ControlId::encoder(*encoder)?, Input::End),
        Envelope::Encoder { encoder, delta } => {
            (ControlId::encoder(*encoder)?, Input::Delta(*delta))
        }
        Envelope::EncoderWheel {
            encoder,
            displacement,
        } => (ControlId::encoder(*encoder)?, Input::Wheel(*displacement)),
        Envelope::EncoderDrag {
            encoder,
            displacement,
        } => (ControlId::encoder(*encoder)?, Input::Drag(*displacement)),
        Envelope::EncoderHold { encoder, offset } => {
            (ControlId::encoder(*encoder)?, Input::Hold(*offset))
        }
        Envelope::PlaybackFader { playback, value } => {
            (ControlId::fader(*playback)?, Input::Value(*value))
        }
        Envelope::PlaybackFaderStart { playback } => (ControlId::fader(*playback)?, Input::Start),
        Envelope::PlaybackFaderEnd { playback } => (ControlId::fader(*playback)?, Input::End),
        Envelope::OscConfig { .. } | Envelope::Playback { .. } | Envelope::Button { .. } => {
            return Err(hog_core::Error::Decode(format!(
                "{} is not a control envelope",
                envelope.kind()
            )))
        }
    };
    Ok(mapped)
}
