use std::sync::Arc;

use super::{SyncError, Upstream};
use crate::event::{BlockPlacedArgs, ChatArgs, EventError, EventManager, PlayerJoinedArgs, PlayerLeftArgs};
use crate::protocol::{BlockEdit, Message, Snapshot};
use crate::world::{BlockCatalog, BlockId, Level, Origin, Participant, PeerId, TileChange, TilePos};

/// Refuse a server whose catalog fingerprint differs from ours: the same id
/// would mean different blocks on each side.
pub fn check_compatible(catalog: &BlockCatalog, server_names: &[String]) -> Result<(), SyncError> {
    if catalog.matches_names(server_names) {
        Ok(())
    } else {
        Err(SyncError::Incompatible)
    }
}

/// A client's copy of the level it is playing in.
///
/// Local edits apply immediately and are forwarded upstream; edits pushed
/// by the server apply without being forwarded back.
pub struct ClientMirror {
    peer: PeerId,
    level: Level,
    events: Arc<EventManager>,
    upstream: Arc<dyn Upstream>,
}

impl std::fmt::Debug for ClientMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientMirror").field("peer", &self.peer).finish_non_exhaustive()
    }
}

impl ClientMirror {
    pub fn new(
        peer: PeerId,
        snapshot: Snapshot,
        catalog: Arc<BlockCatalog>,
        events: Arc<EventManager>,
        upstream: Arc<dyn Upstream>,
    ) -> Result<Self, SyncError> {
        let mut level = Level::from_data(snapshot.level, catalog)?;
        for participant in snapshot.roster {
            level.join(participant);
        }
        level.set_mutation_hook(forward_hook(Arc::clone(&events), Arc::clone(&upstream)));
        Ok(Self {
            peer,
            level,
            events,
            upstream,
        })
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    /// Optimistically place a block. The server may later correct it.
    pub fn place(&mut self, pos: TilePos, block: BlockId) -> Result<Option<TileChange>, SyncError> {
        let block_type = self.level.catalog().resolve(block)?;
        if !block_type.layer().allows(pos.layer) {
            return Err(SyncError::LayerNotAllowed { block, layer: pos.layer });
        }
        Ok(self.level.set(pos, block)?)
    }

    pub fn chat(&self, text: impl Into<String>) {
        self.upstream.send(Message::Chat {
            peer: self.peer,
            text: text.into(),
        });
    }

    /// Apply a message from the server.
    pub fn receive(&mut self, message: Message) -> Result<(), SyncError> {
        let level_id = self.level.id();
        match message {
            Message::BlockPlace(edit) => {
                let pos = edit.pos()?;
                self.level.set_from(pos, edit.block, Origin::Server)?;
            }
            Message::PlayerJoined { peer, uuid, username } => {
                let participant = Participant { peer, uuid, username };
                self.level.join(participant.clone());
                self.events
                    .player_joined
                    .invoke(&mut PlayerJoinedArgs::new(level_id, participant))?;
            }
            Message::PlayerLeft { peer } => {
                if let Some(participant) = self.level.leave(peer) {
                    self.events
                        .player_left
                        .invoke(&mut PlayerLeftArgs::new(level_id, participant))?;
                }
            }
            Message::Chat { peer, text } => {
                let username = self
                    .level
                    .participant(peer)
                    .map(|p| p.username.clone())
                    .unwrap_or_default();
                self.events
                    .chat_received
                    .invoke(&mut ChatArgs::new(level_id, peer, username, text))?;
            }
            other => return Err(SyncError::Unexpected(other.kind())),
        }
        Ok(())
    }
}

/// Send local edits to the server; everything else was already decided
/// there. Observers see every change either way.
fn forward_hook(
    events: Arc<EventManager>,
    upstream: Arc<dyn Upstream>,
) -> impl Fn(&Level, &TileChange) -> Result<(), EventError> + Send + Sync + 'static {
    move |level: &Level, change: &TileChange| {
        if change.origin == Origin::Local {
            upstream.send(Message::BlockPlace(BlockEdit::from(change)));
        }
        events.block_placed.invoke(&mut BlockPlacedArgs::new(level.id(), change))
    }
}
