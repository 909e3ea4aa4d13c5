//! The named events of the game and their argument types.

use uuid::Uuid;

use super::{Event, EventArgs};
use crate::world::{BlockId, Layer, Origin, Participant, PeerId, TileChange, TilePos};

macro_rules! cancellable {
    ($($args:ty),* $(,)?) => {
        $(
            impl EventArgs for $args {
                fn is_cancelled(&self) -> bool {
                    self.cancelled
                }

                fn cancel(&mut self) {
                    self.cancelled = true;
                }
            }
        )*
    };
}

/// A client asked the server to change a tile. Raised before the
/// authoritative write; cancelling it rejects the edit. Handlers may also
/// rewrite `requested`.
#[derive(Debug, Clone)]
pub struct BlockPlacingArgs {
    pub level: Uuid,
    pub peer: PeerId,
    pub pos: TilePos,
    pub requested: BlockId,
    pub current: BlockId,
    /// Level dimensions, `(width, height)`.
    pub bounds: (u16, u16),
    cancelled: bool,
}

impl BlockPlacingArgs {
    pub fn new(level: Uuid, peer: PeerId, pos: TilePos, requested: BlockId, current: BlockId) -> Self {
        Self {
            level,
            peer,
            pos,
            requested,
            current,
            bounds: (0, 0),
            cancelled: false,
        }
    }

    pub fn within(mut self, width: u16, height: u16) -> Self {
        self.bounds = (width, height);
        self
    }

    /// Whether the edit targets the outermost ring of tiles.
    pub fn on_border(&self) -> bool {
        let (w, h) = (i32::from(self.bounds.0), i32::from(self.bounds.1));
        self.pos.x == 0 || self.pos.y == 0 || self.pos.x == w - 1 || self.pos.y == h - 1
    }
}

/// A tile changed. Raised after the write (and, on the server, after the
/// broadcast), so cancelling it changes nothing that already happened.
#[derive(Debug, Clone)]
pub struct BlockPlacedArgs {
    pub level: Uuid,
    pub x: i32,
    pub y: i32,
    pub layer: Layer,
    pub new: BlockId,
    pub old: BlockId,
    pub origin: Origin,
    cancelled: bool,
}

impl BlockPlacedArgs {
    pub fn new(level: Uuid, change: &TileChange) -> Self {
        Self {
            level,
            x: change.pos.x,
            y: change.pos.y,
            layer: change.pos.layer,
            new: change.new,
            old: change.old,
            origin: change.origin,
            cancelled: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayerJoinedArgs {
    pub level: Uuid,
    pub participant: Participant,
    cancelled: bool,
}

impl PlayerJoinedArgs {
    pub fn new(level: Uuid, participant: Participant) -> Self {
        Self {
            level,
            participant,
            cancelled: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayerLeftArgs {
    pub level: Uuid,
    pub participant: Participant,
    cancelled: bool,
}

impl PlayerLeftArgs {
    pub fn new(level: Uuid, participant: Participant) -> Self {
        Self {
            level,
            participant,
            cancelled: false,
        }
    }
}

/// A chat line within a level. On the server, cancelling suppresses the
/// broadcast.
#[derive(Debug, Clone)]
pub struct ChatArgs {
    pub level: Uuid,
    pub peer: PeerId,
    pub username: String,
    pub message: String,
    cancelled: bool,
}

impl ChatArgs {
    pub fn new(level: Uuid, peer: PeerId, username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            peer,
            username: username.into(),
            message: message.into(),
            cancelled: false,
        }
    }
}

cancellable!(BlockPlacingArgs, BlockPlacedArgs, PlayerJoinedArgs, PlayerLeftArgs, ChatArgs);

/// Every game event, shared by core code and extensions through an `Arc`.
#[derive(Debug)]
pub struct EventManager {
    pub block_placing: Event<BlockPlacingArgs>,
    pub block_placed: Event<BlockPlacedArgs>,
    pub player_joined: Event<PlayerJoinedArgs>,
    pub player_left: Event<PlayerLeftArgs>,
    pub chat_received: Event<ChatArgs>,
}

impl EventManager {
    pub fn new() -> Self {
        Self {
            block_placing: Event::new("BlockPlacing"),
            block_placed: Event::new("BlockPlaced"),
            player_joined: Event::new("PlayerJoined"),
            player_left: Event::new("PlayerLeft"),
            chat_received: Event::new("ChatReceived"),
        }
    }

    /// Drop every handler of every event.
    pub fn clear(&self) {
        self.block_placing.clear_handlers();
        self.block_placed.clear_handlers();
        self.player_joined.clear_handlers();
        self.player_left.clear_handlers();
        self.chat_received.clear_handlers();
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}
