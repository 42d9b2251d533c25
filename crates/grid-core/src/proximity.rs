//! Proximity Detection
//!
//! Finds every pair of agents standing close enough to talk.
//!
//! Detection compares every unordered pair, which is quadratic in the number
//! of agents. Populations here are a handful of agents, so no spatial index.

use grid_events::{ConversationKey, ProximityPair};

use crate::error::GridError;
use crate::registry::Agent;

/// Default maximum distance for two agents to be considered close.
pub const DEFAULT_PROXIMITY_THRESHOLD: f64 = 2.0;

/// Rounds a distance to two decimals for reporting.
pub fn round_distance(distance: f64) -> f64 {
    (distance * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityDetector {
    threshold: f64,
}

impl ProximityDetector {
    pub fn new(threshold: f64) -> Result<Self, GridError> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(GridError::InvalidConfiguration(format!(
                "proximity threshold must be a non-negative number, got {}",
                threshold
            )));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// All unordered pairs of distinct agents within the threshold, sorted by
    /// their canonical identity pair.
    pub fn detect(&self, agents: &[Agent]) -> Vec<ProximityPair> {
        let mut pairs = Vec::new();

        for (i, a) in agents.iter().enumerate() {
            for b in &agents[i + 1..] {
                let distance = a.position.distance_to(&b.position);
                if distance > self.threshold {
                    continue;
                }
                // Duplicate identities cannot form a pair
                if let Ok(key) = ConversationKey::new(a.id.clone(), b.id.clone()) {
                    pairs.push(ProximityPair::new(key, round_distance(distance)));
                }
            }
        }

        pairs.sort_by(|x, y| x.participants.cmp(&y.participants));
        pairs
    }
}

impl Default for ProximityDetector {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_PROXIMITY_THRESHOLD,
        }
    }
}
