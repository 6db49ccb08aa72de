use crate::geometry::Vec2;
use std::collections::BTreeSet;

/// Reservation grid over an intersection's footprint. Tiles only name cells,
/// they have no physical effect.
#[derive(Debug, Clone)]
pub struct TileGrid {
    width: usize,
    height: usize,
    tile_size: f64,
    offset: Vec2,
}

impl TileGrid {
    pub fn new(width: usize, height: usize, tile_size: f64, offset: Vec2) -> Self {
        Self {
            width,
            height,
            tile_size,
            offset,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn num_tiles(&self) -> usize {
        self.width * self.height
    }

    /// Index of the tile containing `pos`, `None` outside the footprint.
    pub fn pos_to_index(&self, pos: &Vec2) -> Option<u8> {
        let rel = (pos - self.offset) / self.tile_size;
        if rel.x < 0.0 || rel.y < 0.0 {
            return None;
        }
        let (x, y) = (rel.x.floor() as usize, rel.y.floor() as usize);
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y * self.width + x) as u8)
    }

    /// Collects the tiles touched by `points`.
    pub fn tiles_for<'a>(&self, points: impl IntoIterator<Item = &'a Vec2>) -> TileSet {
        points.into_iter().filter_map(|p| self.pos_to_index(p)).collect()
    }
}

/// A set of tile indices, ordered so equal sets always encode identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TileSet(BTreeSet<u8>);

impl TileSet {
    pub fn insert(&mut self, index: u8) {
        self.0.insert(index);
    }

    pub fn extend(&mut self, other: &TileSet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn contains(&self, index: u8) -> bool {
        self.0.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_disjoint(&self, other: &TileSet) -> bool {
        self.0.is_disjoint(&other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }

    /// Wire form: one byte per tile, ascending.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().copied().collect()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        TileSet(bytes.iter().copied().collect())
    }
}

impl FromIterator<u8> for TileSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        TileSet(iter.into_iter().collect())
    }
}
