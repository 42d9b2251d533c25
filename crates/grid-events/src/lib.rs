//! Shared data types for the agent grid simulation.
//!
//! This crate contains pure data structures with no simulation logic:
//! grid geometry, agent identity, conversation transcripts and tick reports.
//! It is a dependency for all other crates in the workspace.

pub mod agent;
pub mod conversation;
pub mod grid;
pub mod report;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub use agent::{AgentId, AgentStatus};
pub use conversation::{ConversationKey, ConversationTurn, PairError, Transcript};
pub use grid::{GridBounds, Position, DEFAULT_X_MAX, DEFAULT_Y_MAX};
pub use report::{
    AgentAction, AgentActionRecord, ConversationFailure, MovementDelta, ProximityPair, TickReport,
};
