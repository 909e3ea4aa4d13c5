pub mod block;
pub mod grid;
pub mod level;
pub mod position;

pub use block::{BlockCatalog, BlockId, BlockType, CatalogBuilder, CatalogError, Collision, LayerMask};
pub use grid::{Tile, TileGrid};
pub use level::{Level, LevelData, LevelMeta, Origin, Participant, PeerId, PlayerRef, TileChange};
pub use position::{Layer, Spawn, TilePos};

use crate::event::EventError;

/// Failures of grid access and level construction.
///
/// Bounds and id errors are reported at the call site and never retried;
/// whoever owns the offending peer decides what to do with it.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("tile ({x}, {y}, {layer}) is outside the level")]
    OutOfBounds { x: i32, y: i32, layer: i32 },
    #[error("unknown block type id {0}")]
    UnknownBlockTypeId(BlockId),
    #[error("unknown block type {0:?}")]
    UnknownBlockName(String),
    #[error("a {width} x {height} level is not allowed")]
    InvalidSize { width: u16, height: u16 },
    #[error("level data holds {actual} cells, expected {expected}")]
    MalformedLevel { expected: usize, actual: usize },
    /// The write happened, but the mutation hook failed afterwards.
    #[error(transparent)]
    Hook(#[from] EventError),
}
