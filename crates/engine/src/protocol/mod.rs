//! Wire messages exchanged between the server and its clients.
//!
//! Bodies are `bincode` in big-endian fixed-int mode: a 4-byte variant index,
//! then the fields in declaration order. Strings and lists carry a `u64`
//! length. A [`BlockEdit`] is therefore exactly `i16 x, i16 y, i8 layer,
//! i16 block` after its index. [`framing`] wraps bodies in a length prefix
//! for stream transports.

pub mod framing;

use std::io;

use bincode::Options;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::world::{BlockId, LevelData, Participant, PeerId, TileChange, TilePos, WorldError};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("message ended early")]
    UnexpectedEof,
    #[error("unknown message tag {0:#x}")]
    UnknownTag(u32),
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("{0} bytes left over after the message")]
    TrailingBytes(usize),
    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),
    #[error("malformed message: {0}")]
    Malformed(String),
}

impl From<bincode::Error> for ProtocolError {
    fn from(err: bincode::Error) -> Self {
        match *err {
            // Decoding is limited to the body length, so running past the
            // limit means a field or length claimed bytes that are not there.
            bincode::ErrorKind::SizeLimit => ProtocolError::UnexpectedEof,
            bincode::ErrorKind::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => ProtocolError::UnexpectedEof,
            bincode::ErrorKind::InvalidUtf8Encoding(_) => ProtocolError::InvalidUtf8,
            ref other => ProtocolError::Malformed(other.to_string()),
        }
    }
}

fn wire() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

/// One tile edit as it travels between peers. The target level is the
/// sender's current level.
///
/// `layer` stays raw so that a bad value is reported as an out-of-bounds
/// edit by whoever applies it, not as a malformed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockEdit {
    pub x: i16,
    pub y: i16,
    pub layer: i8,
    pub block: BlockId,
}

impl BlockEdit {
    /// Positions inside a level always fit, see [`TileGrid::MAX_SIDE`](crate::world::TileGrid::MAX_SIDE).
    pub fn new(pos: TilePos, block: BlockId) -> Self {
        Self {
            x: pos.x as i16,
            y: pos.y as i16,
            layer: pos.layer.index() as i8,
            block,
        }
    }

    pub fn pos(&self) -> Result<TilePos, WorldError> {
        TilePos::from_raw(i32::from(self.x), i32::from(self.y), i32::from(self.layer))
    }
}

impl From<&TileChange> for BlockEdit {
    fn from(change: &TileChange) -> Self {
        Self::new(change.pos, change.new)
    }
}

/// Entry of the level list sent during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSummary {
    pub id: Uuid,
    pub name: String,
    pub players: u16,
}

/// Everything a client needs to mirror a level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub level: LevelData,
    pub roster: Vec<Participant>,
}

/// Variant order is the wire tag; append new messages at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Hello {
        username: String,
    },
    Welcome {
        peer: PeerId,
        server_name: String,
        intro: String,
        /// Catalog fingerprint: every block name in id order.
        block_names: Vec<String>,
        levels: Vec<LevelSummary>,
    },
    JoinLevel {
        level: Uuid,
    },
    LevelSnapshot(Box<Snapshot>),
    BlockPlace(BlockEdit),
    PlayerJoined {
        peer: PeerId,
        uuid: Uuid,
        username: String,
    },
    PlayerLeft {
        peer: PeerId,
    },
    /// Client to server the `peer` field is ignored and filled in by the
    /// server from the session.
    Chat {
        peer: PeerId,
        text: String,
    },
    Disconnect {
        reason: String,
    },
}

impl Message {
    /// Number of message kinds, one past the highest tag.
    const KINDS: u32 = 9;

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "Hello",
            Message::Welcome { .. } => "Welcome",
            Message::JoinLevel { .. } => "JoinLevel",
            Message::LevelSnapshot(_) => "LevelSnapshot",
            Message::BlockPlace(_) => "BlockPlace",
            Message::PlayerJoined { .. } => "PlayerJoined",
            Message::PlayerLeft { .. } => "PlayerLeft",
            Message::Chat { .. } => "Chat",
            Message::Disconnect { .. } => "Disconnect",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(wire().serialize(self)?)
    }

    /// Decode one complete body. Bytes left over after the message are an
    /// error, and no declared length may reach past the end of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let head = bytes.first_chunk::<4>().ok_or(ProtocolError::UnexpectedEof)?;
        let tag = u32::from_be_bytes(*head);
        if tag >= Self::KINDS {
            return Err(ProtocolError::UnknownTag(tag));
        }

        let mut rest = bytes;
        let message = wire().with_limit(bytes.len() as u64).deserialize_from(&mut rest)?;
        if !rest.is_empty() {
            return Err(ProtocolError::TrailingBytes(rest.len()));
        }
        Ok(message)
    }
}
