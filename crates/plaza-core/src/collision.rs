//! Immutable walkability grid derived from a level's colliding layers.

use crate::level::LevelData;

/// Row-major bitmap of blocked cells. Built once per level and shared by
/// every walker; lookups never allocate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollisionMap {
    width: i64,
    height: i64,
    blocked: Vec<bool>,
}

impl CollisionMap {
    /// Union of every layer marked `collides`. A cell is blocked if any
    /// colliding layer has a non-zero tile there.
    pub fn from_level(level: &LevelData) -> Self {
        let width = level.width.max(0);
        let height = level.height.max(0);
        let mut blocked = vec![false; (width * height) as usize];

        for layer in level.layers.iter().filter(|layer| layer.collides) {
            for (y, row) in layer.grid.iter().enumerate().take(height as usize) {
                for (x, tile) in row.iter().enumerate().take(width as usize) {
                    if *tile != 0 {
                        blocked[y * width as usize + x] = true;
                    }
                }
            }
        }

        Self {
            width,
            height,
            blocked,
        }
    }

    /// Builds a map directly from wire-format rows; used by tests and by
    /// clients replaying a `/see` response.
    pub fn from_rows(rows: &[Vec<u8>]) -> Self {
        let height = rows.len() as i64;
        let width = rows.first().map(|row| row.len()).unwrap_or(0) as i64;
        let mut blocked = vec![false; (width * height).max(0) as usize];

        for (y, row) in rows.iter().enumerate() {
            for (x, tile) in row.iter().enumerate().take(width as usize) {
                if *tile != 0 {
                    blocked[y * width as usize + x] = true;
                }
            }
        }

        Self {
            width,
            height,
            blocked,
        }
    }

    /// True for blocked cells and for anything outside the grid, so callers
    /// never need a separate bounds check.
    pub fn is_blocked(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return true;
        }
        self.blocked[(y * self.width + x) as usize]
    }

    pub fn width(&self) -> i64 {
        self.width
    }

    pub fn height(&self) -> i64 {
        self.height
    }

    /// Wire-format rows for `/see`: 1 = blocked, 0 = walkable.
    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        (0..self.height)
            .map(|y| {
                (0..self.width)
                    .map(|x| u8::from(self.blocked[(y * self.width + x) as usize]))
                    .collect()
            })
            .collect()
    }
}
