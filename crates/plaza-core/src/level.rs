//! Static level data: tile layers, room rectangles, and the spawn point.

use std::fmt;
use std::fs;
use std::path::Path;

use contracts::Position;
use serde::{Deserialize, Serialize};

use crate::TILE_SIZE;

/// A named axis-aligned rectangle in pixel space.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    pub name: String,
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

impl Room {
    /// Point-in-rectangle with inclusive bounds on all four edges.
    pub fn contains_pixel(&self, px: i64, py: i64) -> bool {
        px >= self.x && px <= self.x + self.w && py >= self.y && py <= self.y + self.h
    }

    /// Membership test for a grid cell, using the cell's origin pixel.
    pub fn contains_cell(&self, position: Position) -> bool {
        self.contains_pixel(position.x * TILE_SIZE, position.y * TILE_SIZE)
    }
}

/// One tile layer. Only layers with `collides` contribute blocked cells;
/// the rest are decorative and carried along untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelLayer {
    pub name: String,
    pub collides: bool,
    /// Row-major, `height` rows of `width` cells; non-zero marks a filled tile.
    pub grid: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelData {
    pub name: String,
    pub width: i64,
    pub height: i64,
    pub spawn: Position,
    pub layers: Vec<LevelLayer>,
    pub rooms: Vec<Room>,
}

#[derive(Debug)]
pub enum LevelError {
    Io(std::io::Error),
    Serde(serde_json::Error),
    BadDimensions { width: i64, height: i64 },
    RaggedLayer { layer: String },
    BlockedSpawn { spawn: Position },
}

impl fmt::Display for LevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "level io error: {err}"),
            Self::Serde(err) => write!(f, "level parse error: {err}"),
            Self::BadDimensions { width, height } => {
                write!(f, "level dimensions must be positive, got {width}x{height}")
            }
            Self::RaggedLayer { layer } => {
                write!(f, "layer '{layer}' does not match the level dimensions")
            }
            Self::BlockedSpawn { spawn } => {
                write!(f, "spawn point {spawn} is blocked or out of bounds")
            }
        }
    }
}

impl std::error::Error for LevelError {}

impl From<std::io::Error> for LevelError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for LevelError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

impl LevelData {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LevelError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, LevelError> {
        let level: LevelData = serde_json::from_str(raw)?;
        level.validate()?;
        Ok(level)
    }

    pub fn validate(&self) -> Result<(), LevelError> {
        if self.width < 1 || self.height < 1 {
            return Err(LevelError::BadDimensions {
                width: self.width,
                height: self.height,
            });
        }

        for layer in &self.layers {
            let rows_ok = layer.grid.len() as i64 == self.height
                && layer
                    .grid
                    .iter()
                    .all(|row| row.len() as i64 == self.width);
            if !rows_ok {
                return Err(LevelError::RaggedLayer {
                    layer: layer.name.clone(),
                });
            }
        }

        let map = crate::collision::CollisionMap::from_level(self);
        if map.is_blocked(self.spawn.x, self.spawn.y) {
            return Err(LevelError::BlockedSpawn { spawn: self.spawn });
        }

        Ok(())
    }

    /// The built-in level used when no level file is configured: a 24x16
    /// walled plaza with an office, a lounge, and some furniture.
    pub fn default_level() -> Self {
        let width = 24_i64;
        let height = 16_i64;

        let walls = grid_from(width, height, |x, y| {
            let border = x == 0 || y == 0 || x == width - 1 || y == height - 1;
            // Vertical partition with a doorway at (12, 7).
            let partition = x == 12 && (1..=6).contains(&y);
            border || partition
        });
        let furniture = grid_from(width, height, |x, y| {
            (x == 5 || x == 6) && (y == 10 || y == 11)
        });
        let floor = grid_from(width, height, |_, _| true);

        Self {
            name: "plaza".to_string(),
            width,
            height,
            spawn: Position::new(2, 2),
            layers: vec![
                LevelLayer {
                    name: "floor".to_string(),
                    collides: false,
                    grid: floor,
                },
                LevelLayer {
                    name: "walls".to_string(),
                    collides: true,
                    grid: walls,
                },
                LevelLayer {
                    name: "furniture".to_string(),
                    collides: true,
                    grid: furniture,
                },
            ],
            rooms: vec![
                Room {
                    name: "Office".to_string(),
                    x: 13 * TILE_SIZE,
                    y: TILE_SIZE,
                    w: 9 * TILE_SIZE,
                    h: 6 * TILE_SIZE,
                },
                Room {
                    name: "Lounge".to_string(),
                    x: TILE_SIZE,
                    y: 9 * TILE_SIZE,
                    w: 10 * TILE_SIZE,
                    h: 5 * TILE_SIZE,
                },
            ],
        }
    }
}

fn grid_from(width: i64, height: i64, mut filled: impl FnMut(i64, i64) -> bool) -> Vec<Vec<u8>> {
    (0..height)
        .map(|y| {
            (0..width)
                .map(|x| if filled(x, y) { 1 } else { 0 })
                .collect()
        })
        .collect()
}
