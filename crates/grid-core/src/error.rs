//! Error Types
//!
//! One error enum per concern. Only configuration errors are fatal; the rest
//! are caught at the agent or pair boundary and never abort a tick.

use std::path::PathBuf;

use grid_events::{AgentId, ConversationKey, GridBounds, PairError, Position};
use thiserror::Error;

/// Grid geometry errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("position {position} is outside bounds {bounds}")]
    OutOfBounds {
        position: Position,
        bounds: GridBounds,
    },
}

/// Agent registry errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("agent '{0}' is already registered")]
    DuplicateIdentity(AgentId),

    #[error("unknown agent '{0}'")]
    UnknownAgent(AgentId),

    #[error("invalid agent identity '{0}': use ASCII letters, digits, '-' or '_'")]
    InvalidIdentity(String),

    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Transcript storage errors.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transcript for {key} could not be decoded: {source}")]
    Decode {
        key: ConversationKey,
        #[source]
        source: serde_json::Error,
    },

    #[error("transcript stored for {key} belongs to {found}")]
    ParticipantMismatch {
        key: ConversationKey,
        found: ConversationKey,
    },

    #[error("transcript for {key} could not be encoded: {source}")]
    Encode {
        key: ConversationKey,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl PersistenceError {
    /// The stored record exists but is unusable for its key.
    pub fn is_corrupt_record(&self) -> bool {
        matches!(
            self,
            PersistenceError::Decode { .. } | PersistenceError::ParticipantMismatch { .. }
        )
    }
}

/// Language model failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("empty response from model")]
    EmptyResponse,
}

/// Failure of a single conversational exchange.
#[derive(Error, Debug)]
pub enum ConversationError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Pair(#[from] PairError),
}

impl ConversationError {
    /// Only generation failures are worth a caller-side retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConversationError::Generation(_))
    }
}

/// Errors that can occur while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<GridError> for ConfigError {
    fn from(e: GridError) -> Self {
        match e {
            GridError::InvalidConfiguration(msg) => ConfigError::InvalidConfiguration(msg),
            other => ConfigError::InvalidConfiguration(other.to_string()),
        }
    }
}
