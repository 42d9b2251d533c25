//! Grid Geometry
//!
//! Integer positions on a bounded 2D grid.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default inclusive upper bound on the x axis.
pub const DEFAULT_X_MAX: i32 = 34;

/// Default inclusive upper bound on the y axis.
pub const DEFAULT_Y_MAX: i32 = 20;

/// A cell on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position.
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        (dx * dx + dy * dy).sqrt()
    }

    /// This position shifted by the given step, or `None` if either
    /// coordinate would overflow.
    pub fn checked_offset(&self, dx: i32, dy: i32) -> Option<Self> {
        Some(Self {
            x: self.x.checked_add(dx)?,
            y: self.y.checked_add(dy)?,
        })
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i32, i32)> for Position {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// Inclusive grid bounds: a position is valid when `0 <= x <= x_max` and
/// `0 <= y <= y_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridBounds {
    pub x_max: i32,
    pub y_max: i32,
}

impl GridBounds {
    pub fn new(x_max: i32, y_max: i32) -> Self {
        Self { x_max, y_max }
    }

    /// Bounds are usable only if both maxima are non-negative.
    pub fn is_valid(&self) -> bool {
        self.x_max >= 0 && self.y_max >= 0
    }

    pub fn contains(&self, position: &Position) -> bool {
        (0..=self.x_max).contains(&position.x) && (0..=self.y_max).contains(&position.y)
    }

    /// Number of cells inside the bounds, zero for invalid bounds.
    pub fn cell_count(&self) -> u64 {
        if !self.is_valid() {
            return 0;
        }
        (self.x_max as u64 + 1) * (self.y_max as u64 + 1)
    }
}

impl Default for GridBounds {
    fn default() -> Self {
        Self {
            x_max: DEFAULT_X_MAX,
            y_max: DEFAULT_Y_MAX,
        }
    }
}

impl fmt::Display for GridBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0..={} x 0..={}", self.x_max, self.y_max)
    }
}
