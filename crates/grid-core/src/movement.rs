//! Grid Movement
//!
//! Random one-cell steps that never leave the grid.

use grid_events::{GridBounds, Position};
use rand::Rng;

use crate::error::GridError;

/// Default number of random draws before an agent stays in place.
pub const DEFAULT_MOVE_ATTEMPTS: u32 = 10;

/// Proposes random steps of -1, 0 or +1 on each axis.
///
/// At most `max_attempts` candidates are drawn; the first one inside the
/// bounds wins. When every draw lands outside, the agent stays where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridMover {
    max_attempts: u32,
}

impl GridMover {
    pub fn new(max_attempts: u32) -> Result<Self, GridError> {
        if max_attempts == 0 {
            return Err(GridError::InvalidConfiguration(
                "move attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self { max_attempts })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Checks bounds and start position before any draw.
    pub fn validate(position: &Position, bounds: &GridBounds) -> Result<(), GridError> {
        if !bounds.is_valid() {
            return Err(GridError::InvalidConfiguration(format!(
                "grid bounds must be non-negative, got {}",
                bounds
            )));
        }
        if !bounds.contains(position) {
            return Err(GridError::OutOfBounds {
                position: *position,
                bounds: *bounds,
            });
        }
        Ok(())
    }

    /// Returns the next position for an agent currently at `position`.
    pub fn propose<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        position: Position,
        bounds: &GridBounds,
    ) -> Result<Position, GridError> {
        Self::validate(&position, bounds)?;

        for _ in 0..self.max_attempts {
            let step = position.checked_offset(rng.gen_range(-1..=1), rng.gen_range(-1..=1));
            if let Some(candidate) = step.filter(|c| bounds.contains(c)) {
                return Ok(candidate);
            }
        }
        Ok(position)
    }
}

impl Default for GridMover {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MOVE_ATTEMPTS,
        }
    }
}
