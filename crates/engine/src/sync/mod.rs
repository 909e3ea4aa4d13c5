//! Keeping level replicas consistent.
//!
//! The server owns every level through an [`Authority`]; each client keeps a
//! [`ClientMirror`] of the one level it is in. A write on either side goes
//! through [`Level::set_from`](crate::world::Level::set_from), and the level's
//! mutation hook turns it into network traffic. The [`Origin`] of the write
//! decides where it goes, so a change is never sent back to where it came
//! from.

mod authority;
mod mirror;

pub use authority::Authority;
pub use mirror::{ClientMirror, check_compatible};

use uuid::Uuid;

use crate::event::EventError;
use crate::protocol::Message;
use crate::world::{BlockId, Layer, Origin, PeerId, TileChange, WorldError};

/// Server-side outbound seam. Implementations queue the message and return
/// immediately; they must never block while a level is locked.
pub trait PeerTransport: Send + Sync {
    fn send(&self, peer: PeerId, message: Message);
}

/// Client-side outbound seam to the server.
pub trait Upstream: Send + Sync {
    fn send(&self, message: Message);
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("no open level {0}")]
    UnknownLevel(Uuid),
    #[error("{peer} is not in level {level}")]
    NotInLevel { level: Uuid, peer: PeerId },
    #[error("block {block} cannot be placed on the {layer:?} layer")]
    LayerNotAllowed { block: BlockId, layer: Layer },
    /// A `block_placing` handler swapped in a block that cannot go where
    /// the edit was aimed. The edit is dropped.
    #[error("handler substituted block {block}, which cannot be placed on the {layer:?} layer")]
    InvalidRewrite { block: BlockId, layer: Layer },
    #[error("server block catalog differs from ours")]
    Incompatible,
    #[error("unexpected {0} message")]
    Unexpected(&'static str),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Result of an edit request that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied(TileChange),
    /// The tile already held the requested block.
    Unchanged,
    /// A `block_placing` handler cancelled the edit; the origin was sent
    /// the authoritative tile.
    Rejected,
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied(_))
    }
}

pub(crate) fn is_echo(origin: Origin, peer: PeerId) -> bool {
    origin.peer() == Some(peer)
}
