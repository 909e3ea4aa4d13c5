//! Registry of connected sessions.
//!
//! Every session owns an unbounded outbox drained by its connection's writer
//! task. The registry is the server's [`PeerTransport`]: the authority hands
//! it messages while a level is locked, and all it does is enqueue.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use bricklayer_engine::protocol::Message;
use bricklayer_engine::sync::PeerTransport;
use bricklayer_engine::world::{Participant, PeerId};
use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::dashboard::Metrics;

/// Information about a connected player, stored in the registry.
#[derive(Clone, Debug, Serialize)]
pub struct SessionInfo {
    pub peer: PeerId,
    pub uuid: Uuid,
    pub username: String,
    pub addr: SocketAddr,
    /// The level they are playing in, if any.
    pub level: Option<Uuid>,
}

impl SessionInfo {
    pub fn participant(&self) -> Participant {
        Participant {
            peer: self.peer,
            uuid: self.uuid,
            username: self.username.clone(),
        }
    }
}

/// Lifecycle events for observers such as the dashboard.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Connected { peer: PeerId, username: String },
    Moved { peer: PeerId, level: Option<Uuid> },
    Disconnected { peer: PeerId },
}

struct Session {
    info: SessionInfo,
    outbox: mpsc::UnboundedSender<Message>,
}

/// Thread-safe registry of all connected sessions.
///
/// Uses `std::sync::RwLock` because every operation is brief and
/// `send` is called from inside level locks, where awaiting is not allowed.
pub struct SessionRegistry {
    sessions: RwLock<IndexMap<PeerId, Session>>,
    next_peer: AtomicU64,
    metrics: Arc<Metrics>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionRegistry {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            sessions: RwLock::new(IndexMap::new()),
            next_peer: AtomicU64::new(1),
            metrics,
            event_tx,
        }
    }

    /// Peer ids are never reused within a process.
    pub fn allocate_peer(&self) -> PeerId {
        PeerId(self.next_peer.fetch_add(1, Ordering::Relaxed))
    }

    /// Add a session unless `capacity` sessions already exist. Returns
    /// whether it was added.
    pub fn register(&self, info: SessionInfo, outbox: mpsc::UnboundedSender<Message>, capacity: usize) -> bool {
        let event = SessionEvent::Connected {
            peer: info.peer,
            username: info.username.clone(),
        };
        {
            let mut sessions = self.sessions.write().expect("session registry poisoned");
            if sessions.len() >= capacity {
                return false;
            }
            sessions.insert(info.peer, Session { info, outbox });
        }
        self.metrics.player_joined();
        // Best-effort: nobody may be listening.
        let _ = self.event_tx.send(event);
        true
    }

    pub fn set_level(&self, peer: PeerId, level: Option<Uuid>) {
        {
            let mut sessions = self.sessions.write().expect("session registry poisoned");
            let Some(session) = sessions.get_mut(&peer) else {
                return;
            };
            session.info.level = level;
        }
        let _ = self.event_tx.send(SessionEvent::Moved { peer, level });
    }

    pub fn level_of(&self, peer: PeerId) -> Option<Uuid> {
        self.sessions
            .read()
            .expect("session registry poisoned")
            .get(&peer)
            .and_then(|s| s.info.level)
    }

    pub fn info(&self, peer: PeerId) -> Option<SessionInfo> {
        self.sessions
            .read()
            .expect("session registry poisoned")
            .get(&peer)
            .map(|s| s.info.clone())
    }

    /// Remove a session. Dropping its outbox lets the writer task finish
    /// once it has flushed what is queued.
    pub fn deregister(&self, peer: PeerId) -> Option<SessionInfo> {
        let removed = self
            .sessions
            .write()
            .expect("session registry poisoned")
            .shift_remove(&peer)?;
        self.metrics.player_left();
        let _ = self.event_tx.send(SessionEvent::Disconnected { peer });
        Some(removed.info)
    }

    /// All sessions in connection order.
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .expect("session registry poisoned")
            .values()
            .map(|s| s.info.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().expect("session registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }
}

impl PeerTransport for SessionRegistry {
    fn send(&self, peer: PeerId, message: Message) {
        let sessions = self.sessions.read().expect("session registry poisoned");
        let delivered = sessions
            .get(&peer)
            .is_some_and(|session| session.outbox.send(message).is_ok());
        if delivered {
            self.metrics.message_sent();
        } else {
            tracing::debug!("Dropping message for closed session {peer}");
            self.metrics.message_dropped();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(peer: PeerId, name: &str) -> SessionInfo {
        SessionInfo {
            peer,
            uuid: Uuid::new_v4(),
            username: name.into(),
            addr: "127.0.0.1:1".parse().unwrap(),
            level: None,
        }
    }

    #[test]
    fn peer_ids_are_unique() {
        let registry = SessionRegistry::new(Arc::new(Metrics::new()));
        let a = registry.allocate_peer();
        let b = registry.allocate_peer();
        assert_ne!(a, b);
    }

    #[test]
    fn send_reaches_only_the_addressed_outbox() {
        let metrics = Arc::new(Metrics::new());
        let registry = SessionRegistry::new(Arc::clone(&metrics));
        let (p1, p2) = (registry.allocate_peer(), registry.allocate_peer());
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        assert!(registry.register(info(p1, "ann"), tx1, 8));
        assert!(registry.register(info(p2, "bob"), tx2, 8));

        registry.send(p2, Message::PlayerLeft { peer: p1 });
        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap(), Message::PlayerLeft { peer: p1 });
        assert_eq!(metrics.snapshot(0).messages_sent, 1);
        assert_eq!(metrics.snapshot(0).players, 2);
    }

    #[test]
    fn capacity_is_enforced() {
        let registry = SessionRegistry::new(Arc::new(Metrics::new()));
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(registry.register(info(registry.allocate_peer(), "ann"), tx.clone(), 1));
        assert!(!registry.register(info(registry.allocate_peer(), "bob"), tx, 1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn deregistered_sessions_drop_messages() {
        let metrics = Arc::new(Metrics::new());
        let registry = SessionRegistry::new(Arc::clone(&metrics));
        let peer = registry.allocate_peer();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register(info(peer, "ann"), tx, 8);
        registry.set_level(peer, Some(Uuid::nil()));
        assert_eq!(registry.level_of(peer), Some(Uuid::nil()));

        let removed = registry.deregister(peer).unwrap();
        assert_eq!(removed.username, "ann");
        registry.send(peer, Message::PlayerLeft { peer });
        assert_eq!(metrics.snapshot(0).messages_dropped, 1);
        assert!(registry.is_empty());
    }
}
