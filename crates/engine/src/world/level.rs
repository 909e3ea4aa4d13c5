use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::WorldError;
use super::block::{BlockCatalog, BlockId, BlockType};
use super::grid::{Tile, TileGrid};
use super::position::{Layer, Spawn, TilePos};
use crate::event::EventError;

/// Identifies one connected session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRef {
    pub uuid: Uuid,
    pub username: String,
}

/// A player currently viewing a level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub peer: PeerId,
    pub uuid: Uuid,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelMeta {
    pub name: String,
    pub description: String,
    pub creator: PlayerRef,
    pub plays: u32,
    pub rating: f64,
}

impl LevelMeta {
    pub fn new(name: impl Into<String>, creator: PlayerRef) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            creator,
            plays: 0,
            rating: 0.0,
        }
    }
}

/// Who caused a tile write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// This process: a local player's action, a command, a plugin.
    Local,
    /// A remote client's request, applied by the server on its behalf.
    Peer(PeerId),
    /// A change pushed by the authoritative server, applied on a client.
    Server,
}

impl Origin {
    pub fn peer(self) -> Option<PeerId> {
        match self {
            Origin::Peer(peer) => Some(peer),
            _ => None,
        }
    }
}

/// Payload of the mutation hook. `old != new` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileChange {
    pub pos: TilePos,
    pub new: BlockId,
    pub old: BlockId,
    pub origin: Origin,
}

/// The single observer slot of a level. Runs after the write has landed,
/// so it can react to a change but never veto it.
pub type MutationHook = Arc<dyn Fn(&Level, &TileChange) -> Result<(), EventError> + Send + Sync>;

/// Persisted and transferable form of a level's contents.
///
/// `palette` lists block names in the id order of the catalog that wrote the
/// data; `cells` holds indices into it. Loading maps names back onto the
/// current catalog, so a level survives a catalog rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelData {
    pub id: Uuid,
    pub meta: LevelMeta,
    pub spawn: Spawn,
    pub width: u16,
    pub height: u16,
    pub palette: Vec<String>,
    pub cells: Vec<i16>,
}

/// One playable world: metadata, a roster and exactly one tile grid.
pub struct Level {
    id: Uuid,
    meta: LevelMeta,
    spawn: Spawn,
    roster: Vec<Participant>,
    tiles: TileGrid,
    catalog: Arc<BlockCatalog>,
    hook: Option<MutationHook>,
    dirty: bool,
}

impl Level {
    pub fn new(id: Uuid, meta: LevelMeta, spawn: Spawn, tiles: TileGrid, catalog: Arc<BlockCatalog>) -> Self {
        Self {
            id,
            meta,
            spawn,
            roster: Vec::new(),
            tiles,
            catalog,
            hook: None,
            dirty: false,
        }
    }

    /// Smallest side of a generated level: the frame plus one open column
    /// or row for the spawn.
    pub const MIN_SIDE: u16 = 3;

    /// Whether [`Level::generate`] accepts these dimensions.
    pub fn check_size(width: u16, height: u16) -> Result<(), WorldError> {
        if width < Self::MIN_SIDE || height < Self::MIN_SIDE {
            return Err(WorldError::InvalidSize { width, height });
        }
        TileGrid::check_size(width, height)
    }

    /// Default content for a new level: a solid frame on the foreground,
    /// air everywhere else. Nothing observes generation.
    pub fn generate(meta: LevelMeta, width: u16, height: u16, catalog: Arc<BlockCatalog>) -> Result<Self, WorldError> {
        Self::check_size(width, height)?;
        let mut tiles = TileGrid::new(width, height)?;
        tiles.fill_border(Layer::Foreground, BlockId::DEFAULT);
        // Just inside the frame.
        let mut level = Self::new(Uuid::new_v4(), meta, Spawn::new(1, 1), tiles, catalog);
        level.dirty = true;
        Ok(level)
    }

    /// Rebuild a level from persisted or received data, remapping its
    /// palette onto `catalog`.
    pub fn from_data(data: LevelData, catalog: Arc<BlockCatalog>) -> Result<Self, WorldError> {
        let remap = data
            .palette
            .iter()
            .map(|name| catalog.id_of(name).ok_or_else(|| WorldError::UnknownBlockName(name.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        let cells = data
            .cells
            .iter()
            .map(|&raw| {
                BlockId(raw)
                    .index()
                    .and_then(|i| remap.get(i).copied())
                    .ok_or(WorldError::UnknownBlockTypeId(BlockId(raw)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let tiles = TileGrid::from_cells(data.width, data.height, cells)?;
        Ok(Self::new(data.id, data.meta, data.spawn, tiles, catalog))
    }

    pub fn to_data(&self) -> LevelData {
        LevelData {
            id: self.id,
            meta: self.meta.clone(),
            spawn: self.spawn,
            width: self.tiles.width(),
            height: self.tiles.height(),
            palette: self.catalog.names(),
            cells: self.tiles.cells().iter().map(|b| b.0).collect(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn meta(&self) -> &LevelMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut LevelMeta {
        self.dirty = true;
        &mut self.meta
    }

    pub fn spawn(&self) -> Spawn {
        self.spawn
    }

    pub fn set_spawn(&mut self, spawn: Spawn) {
        self.spawn = spawn;
        self.dirty = true;
    }

    pub fn tiles(&self) -> &TileGrid {
        &self.tiles
    }

    pub fn catalog(&self) -> &Arc<BlockCatalog> {
        &self.catalog
    }

    pub fn width(&self) -> u16 {
        self.tiles.width()
    }

    pub fn height(&self) -> u16 {
        self.tiles.height()
    }

    pub fn tile(&self, pos: TilePos) -> Result<Tile, WorldError> {
        self.tiles.get(pos)
    }

    /// Untyped read: a layer outside `{0, 1}` is out of bounds.
    pub fn tile_at(&self, x: i32, y: i32, layer: i32) -> Result<Tile, WorldError> {
        self.tiles.get(TilePos::from_raw(x, y, layer)?)
    }

    /// Resolve the block type stored at `pos`.
    pub fn block_type(&self, pos: TilePos) -> Result<&BlockType, WorldError> {
        let tile = self.tiles.get(pos)?;
        self.catalog.resolve(tile.block)
    }

    /// Write a tile on behalf of this process. See [`Level::set_from`].
    pub fn set(&mut self, pos: TilePos, block: BlockId) -> Result<Option<TileChange>, WorldError> {
        self.set_from(pos, block, Origin::Local)
    }

    /// Untyped write: a layer outside `{0, 1}` is out of bounds.
    pub fn set_at(&mut self, x: i32, y: i32, layer: i32, block: BlockId) -> Result<Option<TileChange>, WorldError> {
        self.set_from(TilePos::from_raw(x, y, layer)?, block, Origin::Local)
    }

    /// Write a tile and, if its id changed, run the mutation hook.
    ///
    /// The hook sees the level with the write already applied. If the hook
    /// fails the write stays in place and the error is returned.
    pub fn set_from(&mut self, pos: TilePos, block: BlockId, origin: Origin) -> Result<Option<TileChange>, WorldError> {
        // Bounds before the id, so a bad position is always reported as such.
        self.tiles.get(pos)?;
        self.catalog.resolve(block)?;
        let Some(old) = self.tiles.set(pos, block)? else {
            return Ok(None);
        };
        self.dirty = true;
        let change = TileChange { pos, new: block, old, origin };
        if let Some(hook) = self.hook.clone() {
            hook(self, &change)?;
        }
        Ok(Some(change))
    }

    pub fn set_mutation_hook<F>(&mut self, hook: F)
    where
        F: Fn(&Level, &TileChange) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
    }

    pub fn clear_mutation_hook(&mut self) {
        self.hook = None;
    }

    pub fn has_mutation_hook(&self) -> bool {
        self.hook.is_some()
    }

    // ── Roster ──────────────────────────────────────────────────────────

    /// Add a participant. A peer that is already present is replaced.
    pub fn join(&mut self, participant: Participant) {
        self.roster.retain(|p| p.peer != participant.peer);
        self.roster.push(participant);
    }

    pub fn leave(&mut self, peer: PeerId) -> Option<Participant> {
        let idx = self.roster.iter().position(|p| p.peer == peer)?;
        Some(self.roster.remove(idx))
    }

    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    pub fn participant(&self, peer: PeerId) -> Option<&Participant> {
        self.roster.iter().find(|p| p.peer == peer)
    }

    pub fn contains(&self, peer: PeerId) -> bool {
        self.participant(peer).is_some()
    }

    pub fn record_play(&mut self) {
        self.meta.plays = self.meta.plays.saturating_add(1);
        self.dirty = true;
    }

    // ── Persistence bookkeeping ─────────────────────────────────────────

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Clear and return the modified-since-last-save flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

impl fmt::Debug for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Level")
            .field("id", &self.id)
            .field("name", &self.meta.name)
            .field("width", &self.tiles.width())
            .field("height", &self.tiles.height())
            .field("roster", &self.roster.len())
            .field("hooked", &self.hook.is_some())
            .finish()
    }
}
