use std::fmt;

use serde::{Deserialize, Serialize};

use super::WorldError;

/// One of the two planes of a level. Only the foreground collides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Layer {
    Background = 0,
    Foreground = 1,
}

impl Layer {
    pub const COUNT: usize = 2;
    pub const ALL: [Layer; Layer::COUNT] = [Layer::Background, Layer::Foreground];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn from_index(raw: i32) -> Option<Layer> {
        match raw {
            0 => Some(Layer::Background),
            1 => Some(Layer::Foreground),
            _ => None,
        }
    }
}

/// Address of one tile: column, row and layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TilePos {
    pub x: i32,
    pub y: i32,
    pub layer: Layer,
}

impl TilePos {
    pub const fn new(x: i32, y: i32, layer: Layer) -> Self {
        Self { x, y, layer }
    }

    pub const fn foreground(x: i32, y: i32) -> Self {
        Self::new(x, y, Layer::Foreground)
    }

    pub const fn background(x: i32, y: i32) -> Self {
        Self::new(x, y, Layer::Background)
    }

    /// Build a position from untyped coordinates. A layer outside `{0, 1}`
    /// is an out-of-bounds access like any other bad coordinate.
    pub fn from_raw(x: i32, y: i32, layer: i32) -> Result<Self, WorldError> {
        Layer::from_index(layer)
            .map(|layer| Self::new(x, y, layer))
            .ok_or(WorldError::OutOfBounds { x, y, layer })
    }
}

impl fmt::Display for TilePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.layer.index())
    }
}

/// Where players appear when they join a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Spawn {
    pub x: i16,
    pub y: i16,
}

impl Spawn {
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}
