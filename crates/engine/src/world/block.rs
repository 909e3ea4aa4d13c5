//! Block types and the catalog that numbers them.
//!
//! A [`BlockId`] is the wire-level encoding of a tile's contents. Ids are dense
//! and handed out in registration order, so they only mean something relative
//! to the catalog build that produced them: two peers agree on tile contents
//! only if they registered the same types in the same order.
//!
//! The catalog is assembled through a [`CatalogBuilder`] while extensions load
//! and then frozen into an `Arc<BlockCatalog>` that is never mutated again.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::WorldError;
use super::position::Layer;

/// Dense block type identifier, as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub i16);

impl BlockId {
    /// The universal "empty" block.
    pub const AIR: BlockId = BlockId(0);
    /// The built-in solid block.
    pub const DEFAULT: BlockId = BlockId(1);

    pub const fn new(id: i16) -> Self {
        Self(id)
    }

    /// Position in the catalog table, or `None` for negative ids.
    #[inline]
    pub const fn index(self) -> Option<usize> {
        if self.0 < 0 { None } else { Some(self.0 as usize) }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which layer(s) a block type may occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerMask {
    Background,
    Foreground,
    All,
}

impl LayerMask {
    pub const fn allows(self, layer: Layer) -> bool {
        matches!(
            (self, layer),
            (LayerMask::All, _)
                | (LayerMask::Background, Layer::Background)
                | (LayerMask::Foreground, Layer::Foreground)
        )
    }
}

/// How players collide with a block. Only consulted for the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Collision {
    #[default]
    Passable,
    Impassable,
}

/// Immutable descriptor of one block type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockType {
    id: BlockId,
    name: String,
    layer: LayerMask,
    collision: Collision,
}

impl BlockType {
    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layer(&self) -> LayerMask {
        self.layer
    }

    pub fn collision(&self) -> Collision {
        self.collision
    }

    pub fn is_solid(&self) -> bool {
        self.collision == Collision::Impassable
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("block type {0:?} is already registered")]
    DuplicateName(String),
    #[error("block catalog is full ({0} types)")]
    Full(usize),
}

/// Append-only table used during startup. Call [`CatalogBuilder::freeze`]
/// once extension loading has finished.
#[derive(Debug, Clone)]
pub struct CatalogBuilder {
    types: Vec<BlockType>,
    by_name: HashMap<String, BlockId>,
}

impl CatalogBuilder {
    /// A builder seeded with the two built-in types, `Air` (id 0) and
    /// `Default` (id 1).
    pub fn new() -> Self {
        let mut builder = Self::empty();
        builder.push("Air".into(), LayerMask::All, Collision::Passable);
        builder.push("Default".into(), LayerMask::All, Collision::Impassable);
        builder
    }

    /// A builder with no types at all.
    pub fn empty() -> Self {
        Self {
            types: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Register a block type, assigning it the next free id.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        layer: LayerMask,
        collision: Collision,
    ) -> Result<BlockType, CatalogError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(CatalogError::DuplicateName(name));
        }
        if i16::try_from(self.types.len()).is_err() {
            return Err(CatalogError::Full(self.types.len()));
        }
        Ok(self.push(name, layer, collision))
    }

    /// Callers have already checked the name is free and the table has room.
    fn push(&mut self, name: String, layer: LayerMask, collision: Collision) -> BlockType {
        let block = BlockType {
            id: BlockId(self.types.len() as i16),
            name,
            layer,
            collision,
        };
        self.by_name.insert(block.name.clone(), block.id);
        self.types.push(block.clone());
        block
    }

    pub fn id_of(&self, name: &str) -> Option<BlockId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// End the registration phase.
    pub fn freeze(self) -> Arc<BlockCatalog> {
        tracing::debug!("Block catalog frozen with {} types", self.types.len());
        Arc::new(BlockCatalog {
            types: self.types,
            by_name: self.by_name,
        })
    }
}

impl Default for CatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Frozen id <-> block type table. Read-only, so it can be shared across
/// threads behind an `Arc` without locking.
#[derive(Debug)]
pub struct BlockCatalog {
    types: Vec<BlockType>,
    by_name: HashMap<String, BlockId>,
}

impl BlockCatalog {
    /// Look up a block type by id. O(1): ids index the table directly.
    #[inline]
    pub fn resolve(&self, id: BlockId) -> Result<&BlockType, WorldError> {
        self.get(id).ok_or(WorldError::UnknownBlockTypeId(id))
    }

    #[inline]
    pub fn get(&self, id: BlockId) -> Option<&BlockType> {
        id.index().and_then(|i| self.types.get(i))
    }

    pub fn id_of(&self, name: &str) -> Option<BlockId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockType> {
        self.types.iter()
    }

    /// Block names in id order. Two catalogs with equal name lists encode
    /// tiles identically.
    pub fn names(&self) -> Vec<String> {
        self.types.iter().map(|t| t.name.clone()).collect()
    }

    pub fn matches_names(&self, names: &[String]) -> bool {
        self.types.len() == names.len() && self.types.iter().zip(names).all(|(t, n)| t.name == *n)
    }
}
