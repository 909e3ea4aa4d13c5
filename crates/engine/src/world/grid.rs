use super::WorldError;
use super::block::BlockId;
use super::position::{Layer, TilePos};

/// The contents of one cell on one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tile {
    pub block: BlockId,
}

impl Tile {
    pub const AIR: Tile = Tile { block: BlockId::AIR };

    pub const fn new(block: BlockId) -> Self {
        Self { block }
    }
}

/// A `width x height x 2` array of block ids.
///
/// Stored as one flat slice, layer-major then row-major, so a whole layer is
/// contiguous for serialization. The grid itself knows nothing about block
/// types or observers; [`Level`](super::Level) layers both on top.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileGrid {
    width: u16,
    height: u16,
    cells: Box<[BlockId]>,
}

impl TileGrid {
    /// Largest side length. Coordinates travel as `i16` on the wire.
    pub const MAX_SIDE: u16 = i16::MAX as u16;

    /// Largest `width * height`. Both layers of a grid this size, plus the
    /// rest of a level snapshot, still fit one protocol frame.
    pub const MAX_AREA: usize = 2000 * 2000;

    /// A grid filled with air.
    pub fn new(width: u16, height: u16) -> Result<Self, WorldError> {
        Self::new_filled(width, height, BlockId::AIR)
    }

    pub fn new_filled(width: u16, height: u16, block: BlockId) -> Result<Self, WorldError> {
        Self::check_size(width, height)?;
        Ok(Self {
            width,
            height,
            cells: vec![block; Self::volume(width, height)].into_boxed_slice(),
        })
    }

    /// Rebuild a grid from cells in storage order. Fails if the cell count
    /// does not match the dimensions.
    pub fn from_cells(width: u16, height: u16, cells: Vec<BlockId>) -> Result<Self, WorldError> {
        Self::check_size(width, height)?;
        let expected = Self::volume(width, height);
        if cells.len() != expected {
            return Err(WorldError::MalformedLevel {
                expected,
                actual: cells.len(),
            });
        }
        Ok(Self {
            width,
            height,
            cells: cells.into_boxed_slice(),
        })
    }

    /// Both sides non-zero and within [`TileGrid::MAX_SIDE`], the area
    /// within [`TileGrid::MAX_AREA`].
    pub fn check_size(width: u16, height: u16) -> Result<(), WorldError> {
        let sides_fit = (1..=Self::MAX_SIDE).contains(&width) && (1..=Self::MAX_SIDE).contains(&height);
        if sides_fit && width as usize * height as usize <= Self::MAX_AREA {
            Ok(())
        } else {
            Err(WorldError::InvalidSize { width, height })
        }
    }

    pub const fn volume(width: u16, height: u16) -> usize {
        width as usize * height as usize * Layer::COUNT
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn contains(&self, pos: TilePos) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < i32::from(self.width) && pos.y < i32::from(self.height)
    }

    #[inline]
    fn index(&self, pos: TilePos) -> Result<usize, WorldError> {
        if !self.contains(pos) {
            return Err(WorldError::OutOfBounds {
                x: pos.x,
                y: pos.y,
                layer: pos.layer.index() as i32,
            });
        }
        let (w, h) = (self.width as usize, self.height as usize);
        Ok((pos.layer.index() * h + pos.y as usize) * w + pos.x as usize)
    }

    #[inline]
    pub fn get(&self, pos: TilePos) -> Result<Tile, WorldError> {
        self.index(pos).map(|i| Tile::new(self.cells[i]))
    }

    /// Write a cell. Returns the previous id if it differed from `block`,
    /// `None` if the write changed nothing.
    #[inline]
    pub fn set(&mut self, pos: TilePos, block: BlockId) -> Result<Option<BlockId>, WorldError> {
        let i = self.index(pos)?;
        let old = std::mem::replace(&mut self.cells[i], block);
        Ok((old != block).then_some(old))
    }

    /// Surround `layer` with a one-tile frame of `block`.
    pub fn fill_border(&mut self, layer: Layer, block: BlockId) {
        let (w, h) = (self.width as usize, self.height as usize);
        let base = layer.index() * w * h;
        for y in 0..h {
            for x in 0..w {
                if x == 0 || y == 0 || x == w - 1 || y == h - 1 {
                    self.cells[base + y * w + x] = block;
                }
            }
        }
    }

    /// All cells in storage order.
    pub fn cells(&self) -> &[BlockId] {
        &self.cells
    }

    pub fn count(&self, block: BlockId) -> usize {
        self.cells.iter().filter(|b| **b == block).count()
    }
}
