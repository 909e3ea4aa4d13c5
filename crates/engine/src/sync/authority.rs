use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use uuid::Uuid;

use super::{EditOutcome, PeerTransport, SyncError, is_echo};
use crate::event::{BlockPlacedArgs, BlockPlacingArgs, ChatArgs, EventArgs, EventError, EventManager, PlayerJoinedArgs, PlayerLeftArgs};
use crate::protocol::{BlockEdit, LevelSummary, Message, Snapshot};
use crate::world::{BlockCatalog, BlockId, Level, Origin, Participant, PeerId, TileChange, TilePos, WorldError};

/// The server's view of every open level.
///
/// Each level sits behind its own mutex, so edits to one level are
/// serialized while different levels proceed in parallel. Nothing awaits
/// while a level is locked: outbound traffic goes through
/// [`PeerTransport::send`], which only enqueues.
///
/// Event handlers run with the level locked. A handler that calls back into
/// the authority for the same level will deadlock.
pub struct Authority {
    catalog: Arc<BlockCatalog>,
    events: Arc<EventManager>,
    transport: Arc<dyn PeerTransport>,
    levels: DashMap<Uuid, Arc<Mutex<Level>>>,
}

impl Authority {
    pub fn new(catalog: Arc<BlockCatalog>, events: Arc<EventManager>, transport: Arc<dyn PeerTransport>) -> Self {
        Self {
            catalog,
            events,
            transport,
            levels: DashMap::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<BlockCatalog> {
        &self.catalog
    }

    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    // ── Level lifecycle ─────────────────────────────────────────────────

    /// Start serving `level`. Installs the broadcast hook; a level already
    /// open under the same id is replaced.
    pub fn open(&self, mut level: Level) -> Uuid {
        let id = level.id();
        level.set_mutation_hook(broadcast_hook(Arc::clone(&self.events), Arc::clone(&self.transport)));
        tracing::info!("Opened level {} ({id})", level.meta().name);
        if self.levels.insert(id, Arc::new(Mutex::new(level))).is_some() {
            tracing::warn!("Level {id} was already open, replaced");
        }
        id
    }

    /// Stop serving a level. Its hook is removed, so later writes to the
    /// returned handle stay local.
    pub fn close(&self, id: Uuid) -> Option<Arc<Mutex<Level>>> {
        let (_, level) = self.levels.remove(&id)?;
        level.lock().expect("level poisoned").clear_mutation_hook();
        tracing::info!("Closed level {id}");
        Some(level)
    }

    pub fn level(&self, id: Uuid) -> Result<Arc<Mutex<Level>>, SyncError> {
        // Clone out of the map so the shard lock is not held while the
        // level is.
        self.levels
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(SyncError::UnknownLevel(id))
    }

    pub fn level_ids(&self) -> Vec<Uuid> {
        self.levels.iter().map(|entry| *entry.key()).collect()
    }

    pub fn handles(&self) -> Vec<Arc<Mutex<Level>>> {
        self.levels.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Level list for the handshake, sorted by name.
    pub fn summaries(&self) -> Vec<LevelSummary> {
        let mut summaries: Vec<_> = self
            .handles()
            .into_iter()
            .map(|handle| {
                let level = handle.lock().expect("level poisoned");
                LevelSummary {
                    id: level.id(),
                    name: level.meta().name.clone(),
                    players: u16::try_from(level.roster().len()).unwrap_or(u16::MAX),
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        summaries
    }

    // ── Roster ──────────────────────────────────────────────────────────

    /// Add a player to a level and return what they need to mirror it.
    /// Everyone already there is told about the newcomer.
    ///
    /// The snapshot is also queued to the newcomer before the level is
    /// unlocked, so no edit can reach them ahead of it.
    pub fn join(&self, level_id: Uuid, participant: Participant) -> Result<Snapshot, SyncError> {
        let handle = self.level(level_id)?;
        let mut level = handle.lock().expect("level poisoned");

        let announce = Message::PlayerJoined {
            peer: participant.peer,
            uuid: participant.uuid,
            username: participant.username.clone(),
        };
        for other in level.roster().iter().filter(|p| p.peer != participant.peer) {
            self.transport.send(other.peer, announce.clone());
        }

        level.join(participant.clone());
        level.record_play();
        let snapshot = Snapshot {
            level: level.to_data(),
            roster: level.roster().to_vec(),
        };
        self.transport
            .send(participant.peer, Message::LevelSnapshot(Box::new(snapshot.clone())));
        tracing::info!(
            "{} joined level {} ({} playing)",
            participant.username,
            level.meta().name,
            level.roster().len()
        );
        self.events
            .player_joined
            .invoke(&mut PlayerJoinedArgs::new(level_id, participant))?;
        Ok(snapshot)
    }

    /// Remove a player from a level. Returns `None` if they were not in it.
    pub fn leave(&self, level_id: Uuid, peer: PeerId) -> Result<Option<Participant>, SyncError> {
        let handle = self.level(level_id)?;
        let mut level = handle.lock().expect("level poisoned");
        let Some(participant) = level.leave(peer) else {
            return Ok(None);
        };
        for other in level.roster() {
            self.transport.send(other.peer, Message::PlayerLeft { peer });
        }
        tracing::info!("{} left level {}", participant.username, level.meta().name);
        self.events
            .player_left
            .invoke(&mut PlayerLeftArgs::new(level_id, participant.clone()))?;
        Ok(Some(participant))
    }

    // ── Edits ───────────────────────────────────────────────────────────

    /// Apply a tile edit requested by `origin`.
    ///
    /// The edit is validated, offered to `block_placing` handlers (which may
    /// cancel it or swap the block), then written. The mutation hook sends
    /// the result to everyone else in the level. Whenever the origin's
    /// optimistic copy ends up wrong, it is sent the authoritative tile.
    pub fn apply_edit(&self, level_id: Uuid, origin: PeerId, edit: BlockEdit) -> Result<EditOutcome, SyncError> {
        let handle = self.level(level_id)?;
        let mut level = handle.lock().expect("level poisoned");

        if !level.contains(origin) {
            return Err(SyncError::NotInLevel { level: level_id, peer: origin });
        }
        let pos = edit.pos()?;
        let current = level.tile(pos)?.block;
        check_layer(&level, pos, edit.block)?;

        let mut intent = BlockPlacingArgs::new(level_id, origin, pos, edit.block, current)
            .within(level.width(), level.height());
        self.events.block_placing.invoke(&mut intent)?;
        if intent.is_cancelled() {
            tracing::debug!("Edit {pos} -> {} by {origin} cancelled", edit.block);
            self.transport.send(origin, Message::BlockPlace(BlockEdit::new(pos, current)));
            return Ok(EditOutcome::Rejected);
        }

        let block = intent.requested;
        if block != edit.block && check_layer(&level, pos, block).is_err() {
            // The handler is at fault, not the peer; the tile keeps its old block.
            tracing::error!("block_placing handler substituted {block} at {pos}, which is not placeable there");
            self.transport.send(origin, Message::BlockPlace(BlockEdit::new(pos, current)));
            return Err(SyncError::InvalidRewrite { block, layer: pos.layer });
        }
        let written = level.set_from(pos, block, Origin::Peer(origin));
        // A failing block_placed handler still leaves the write in place, so
        // the origin is corrected before the error goes up.
        let landed = matches!(written, Ok(_) | Err(WorldError::Hook(_)));
        if landed && block != edit.block {
            self.transport.send(origin, Message::BlockPlace(BlockEdit::new(pos, block)));
        }
        Ok(match written? {
            Some(change) => {
                tracing::debug!("{origin} set {pos} {} -> {}", change.old, change.new);
                EditOutcome::Applied(change)
            }
            None => EditOutcome::Unchanged,
        })
    }

    /// Write a tile on the server's own behalf; every player in the level
    /// receives it.
    pub fn place(&self, level_id: Uuid, pos: TilePos, block: BlockId) -> Result<Option<TileChange>, SyncError> {
        let handle = self.level(level_id)?;
        let mut level = handle.lock().expect("level poisoned");
        check_layer(&level, pos, block)?;
        Ok(level.set(pos, block)?)
    }

    // ── Chat ────────────────────────────────────────────────────────────

    /// Relay a chat line to every player in the level, the sender included.
    /// Returns `false` if a handler cancelled it.
    pub fn chat(&self, level_id: Uuid, peer: PeerId, text: &str) -> Result<bool, SyncError> {
        let handle = self.level(level_id)?;
        let level = handle.lock().expect("level poisoned");
        let username = level
            .participant(peer)
            .map(|p| p.username.clone())
            .ok_or(SyncError::NotInLevel { level: level_id, peer })?;

        let mut args = ChatArgs::new(level_id, peer, username, text);
        self.events.chat_received.invoke(&mut args)?;
        if args.is_cancelled() {
            return Ok(false);
        }
        tracing::info!("[{}] {}: {}", level.meta().name, args.username, args.message);
        let message = Message::Chat {
            peer,
            text: args.message,
        };
        for p in level.roster() {
            self.transport.send(p.peer, message.clone());
        }
        Ok(true)
    }
}

fn check_layer(level: &Level, pos: TilePos, block: BlockId) -> Result<(), SyncError> {
    let block_type = level.catalog().resolve(block)?;
    if block_type.layer().allows(pos.layer) {
        Ok(())
    } else {
        Err(SyncError::LayerNotAllowed { block, layer: pos.layer })
    }
}

/// Fan a change out to the level's roster, minus whoever caused it, then
/// let observers know.
fn broadcast_hook(
    events: Arc<EventManager>,
    transport: Arc<dyn PeerTransport>,
) -> impl Fn(&Level, &TileChange) -> Result<(), EventError> + Send + Sync + 'static {
    move |level: &Level, change: &TileChange| {
        let message = Message::BlockPlace(BlockEdit::from(change));
        for p in level.roster() {
            if !is_echo(change.origin, p.peer) {
                transport.send(p.peer, message.clone());
            }
        }
        events.block_placed.invoke(&mut BlockPlacedArgs::new(level.id(), change))
    }
}
