//! Agent Grid Engine
//!
//! Agents wander a bounded 2D grid one step per tick. Agents that end a tick
//! close to each other hold a short conversation through a language model,
//! and every pair's conversation is kept as a durable transcript.

use rand::rngs::SmallRng;
use rand::SeedableRng;

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod llm;
pub mod movement;
pub mod proximity;
pub mod registry;
pub mod report_log;
pub mod runner;
pub mod setup;
pub mod store;

pub use config::Config;
pub use coordinator::{ConversationCoordinator, CoordinatorSettings, Exchange};
pub use engine::{EngineSettings, TickEngine};
pub use error::{
    ConfigError, ConversationError, GenerationError, GridError, PersistenceError, RegistryError,
};
pub use llm::{ChatMessage, LanguageModel, OpenAiChat, Role, ScriptedModel};
pub use movement::GridMover;
pub use proximity::ProximityDetector;
pub use registry::{Agent, AgentRegistry};
pub use report_log::ReportLog;
pub use runner::{RunOptions, RunSummary};
pub use setup::{populate, spawn_agents};
pub use store::{ConversationStore, FileBackend, MemoryBackend, TranscriptBackend};

/// Movement RNG: seeded for reproducible runs, from entropy otherwise.
pub fn sim_rng(seed: Option<u64>) -> SmallRng {
    match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    }
}
