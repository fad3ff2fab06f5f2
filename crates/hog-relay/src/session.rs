//! Session management

use hog_core::Notice;
use hog_transport::TransportSender;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Session identifier
pub type SessionId = String;

/// A connected touch client
pub struct Session {
    /// Unique session ID
    pub id: SessionId,
    /// Remote address
    pub peer: SocketAddr,
    /// Outbound notice queue, drained by the writer task
    outbound: mpsc::Sender<Notice>,
    alive: AtomicBool,
}

impl Session {
    /// Create a session and the receiving end of its notice queue
    pub fn channel(peer: SocketAddr, capacity: usize) -> (Self, mpsc::Receiver<Notice>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let session = Self {
            id: Uuid::new_v4().to_string(),
            peer,
            outbound,
            alive: AtomicBool::new(true),
        };
        (session, rx)
    }

    /// Create a session whose notices are written to `sender` by a dedicated task
    pub fn spawn(
        sender: Arc<dyn TransportSender>,
        peer: SocketAddr,
        capacity: usize,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (session, mut rx) = Self::channel(peer, capacity);
        let session = Arc::new(session);
        let writer_session = Arc::clone(&session);

        let handle = tokio::spawn(async move {
            while let Some(notice) = rx.recv().await {
                let text = match notice.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to serialize notice: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sender.send(text).await {
                    debug!("Session {} writer stopped: {}", writer_session.id, e);
                    break;
                }
            }
            writer_session.mark_closed();
        });

        (session, handle)
    }

    /// Queue a notice without waiting. Returns false if the session is closed
    /// or its queue is full.
    pub fn notify(&self, notice: Notice) -> bool {
        if !self.is_alive() {
            return false;
        }
        match self.outbound.try_send(notice) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Session {} notice queue full, dropping notice", self.id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_closed();
                false
            }
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn mark_closed(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("alive", &self.is_alive())
            .finish()
    }
}
