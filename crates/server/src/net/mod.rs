//! TCP front end: the listener, one task per connection, and a client for
//! talking to a server from the other side.

pub mod client;
pub mod connection;
pub mod framing;
pub mod listener;

use std::sync::Arc;

use bricklayer_engine::event::EventManager;
use bricklayer_engine::protocol::Message;
use bricklayer_engine::sync::{Authority, PeerTransport};
use bricklayer_engine::world::{BlockCatalog, PeerId};

use crate::config::ServerConfig;
use crate::dashboard::Metrics;
use crate::session::SessionRegistry;

/// Everything a connection task needs, shared via `Arc<ServerContext>`.
pub struct ServerContext {
    pub config: ServerConfig,
    pub authority: Arc<Authority>,
    pub sessions: Arc<SessionRegistry>,
    pub metrics: Arc<Metrics>,
}

impl ServerContext {
    /// Wire an authority to a fresh session registry. The catalog must be
    /// final; extensions have already subscribed to `events`.
    pub fn new(config: ServerConfig, catalog: Arc<BlockCatalog>, events: Arc<EventManager>) -> Self {
        let metrics = Arc::new(Metrics::new());
        let sessions = Arc::new(SessionRegistry::new(Arc::clone(&metrics)));
        let transport: Arc<dyn PeerTransport> = sessions.clone();
        let authority = Arc::new(Authority::new(catalog, events, transport));
        Self {
            config,
            authority,
            sessions,
            metrics,
        }
    }

    /// The handshake reply for `peer`.
    pub fn welcome(&self, peer: PeerId) -> Message {
        Message::Welcome {
            peer,
            server_name: self.config.name.clone(),
            intro: self.config.render_intro(self.sessions.len(), self.authority.len()),
            block_names: self.authority.catalog().names(),
            levels: self.authority.summaries(),
        }
    }
}
