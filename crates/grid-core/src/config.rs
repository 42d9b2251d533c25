//! Configuration System
//!
//! Loads settings from `agent_grid.toml` so runs can be tuned without
//! recompiling. Every section is optional and falls back to defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use grid_events::{GridBounds, Position, DEFAULT_X_MAX, DEFAULT_Y_MAX};

use crate::coordinator::{
    CoordinatorSettings, DEFAULT_MAX_HISTORY_TURNS, DEFAULT_OPENING_MESSAGE, DEFAULT_SYSTEM_PROMPT,
};
use crate::engine::{EngineSettings, DEFAULT_CONVERSATION_CONCURRENCY};
use crate::error::ConfigError;
use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::movement::{GridMover, DEFAULT_MOVE_ATTEMPTS};
use crate::proximity::{ProximityDetector, DEFAULT_PROXIMITY_THRESHOLD};
use crate::store::DEFAULT_TRANSCRIPT_DIR;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "agent_grid.toml";

/// Top-level configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub grid: GridConfig,
    pub proximity: ProximityConfig,
    pub tick: TickConfig,
    pub agents: AgentsConfig,
    pub conversation: ConversationConfig,
    pub model: ModelConfig,
}

/// Grid dimensions and movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub x_max: i32,
    pub y_max: i32,
    /// Random draws before an agent stays put
    pub move_attempts: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            x_max: DEFAULT_X_MAX,
            y_max: DEFAULT_Y_MAX,
            move_attempts: DEFAULT_MOVE_ATTEMPTS,
        }
    }
}

impl GridConfig {
    pub fn bounds(&self) -> GridBounds {
        GridBounds::new(self.x_max, self.y_max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    pub threshold: f64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_PROXIMITY_THRESHOLD,
        }
    }
}

/// Tick loop parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    pub interval_ms: u64,
    /// Stop after this many ticks; 0 runs until interrupted
    pub max_ticks: u64,
    /// Seed for movement; random when absent
    pub seed: Option<u64>,
    pub conversation_concurrency: usize,
    pub conversation_retries: u8,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            max_ticks: 0,
            seed: None,
            conversation_concurrency: DEFAULT_CONVERSATION_CONCURRENCY,
            conversation_retries: 0,
        }
    }
}

impl TickConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// An agent with a fixed identity and starting cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: String,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub persona: Option<String>,
}

impl RosterEntry {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// Agent population. A non-empty roster replaces random spawning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub count: usize,
    pub roster: Vec<RosterEntry>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            count: 4,
            roster: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub transcript_dir: PathBuf,
    pub max_history_turns: usize,
    pub opening_message: String,
    pub system_prompt: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            transcript_dir: PathBuf::from(DEFAULT_TRANSCRIPT_DIR),
            max_history_turns: DEFAULT_MAX_HISTORY_TURNS,
            opening_message: DEFAULT_OPENING_MESSAGE.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl ConversationConfig {
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            opening_message: self.opening_message.clone(),
            system_prompt: self.system_prompt.clone(),
            max_history_turns: self.max_history_turns,
        }
    }
}

/// Which language model backs the conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelProvider {
    /// OpenAI-compatible chat-completions API
    #[default]
    Openai,
    /// Offline canned replies
    Scripted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    pub model: String,
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::Openai,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.7,
            max_tokens: 150,
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from `path` if it exists, otherwise use defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Checks every setting the tick loop depends on. Any error here is
    /// fatal and must be reported before the first tick.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mover()?;
        self.detector()?;
        self.engine_settings().validate()?;

        if self.tick.interval_ms == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "tick interval must be at least 1 ms".to_string(),
            ));
        }
        if self.model.timeout_secs == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "model timeout must be at least 1 second".to_string(),
            ));
        }

        let bounds = self.grid.bounds();
        if self.agents.roster.is_empty() && self.agents.count as u64 > bounds.cell_count() {
            return Err(ConfigError::InvalidConfiguration(format!(
                "{} agents do not fit on a {} grid",
                self.agents.count, bounds
            )));
        }
        for entry in &self.agents.roster {
            if !bounds.contains(&entry.position()) {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "roster agent '{}' starts at {} outside {}",
                    entry.id,
                    entry.position(),
                    bounds
                )));
            }
        }
        Ok(())
    }

    pub fn mover(&self) -> Result<GridMover, ConfigError> {
        Ok(GridMover::new(self.grid.move_attempts)?)
    }

    pub fn detector(&self) -> Result<ProximityDetector, ConfigError> {
        Ok(ProximityDetector::new(self.proximity.threshold)?)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            bounds: self.grid.bounds(),
            conversation_concurrency: self.tick.conversation_concurrency,
            conversation_retries: self.tick.conversation_retries,
        }
    }

    /// Returns the configuration as a TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.grid.bounds(), GridBounds::new(34, 20));
        assert_eq!(config.proximity.threshold, 2.0);
        assert_eq!(config.tick.interval(), Duration::from_secs(1));
        assert_eq!(config.model.model, "gpt-4o-mini-2024-07-18");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [grid]
            x_max = 10

            [tick]
            seed = 42

            [[agents.roster]]
            id = "william"
            x = 5
            y = 5
            persona = "Friendly and helpful."

            [[agents.roster]]
            id = "emma"
            x = 6
            y = 6
            "#,
        )
        .unwrap();

        assert_eq!(config.grid.x_max, 10);
        assert_eq!(config.grid.y_max, 20);
        assert_eq!(config.tick.seed, Some(42));
        assert_eq!(config.agents.roster.len(), 2);
        assert_eq!(config.agents.roster[1].persona, None);
        assert_eq!(config.model.provider, ModelProvider::Openai);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let mut config = Config::default();
        config.grid.x_max = -1;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidConfiguration(_))));

        let mut config = Config::default();
        config.proximity.threshold = -0.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tick.interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tick.conversation_retries = 3;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.grid = GridConfig {
            x_max: 1,
            y_max: 1,
            move_attempts: 10,
        };
        config.agents.count = 5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.agents.roster.push(RosterEntry {
            id: "far".to_string(),
            x: 99,
            y: 0,
            persona: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            Config::from_toml("[grid]\nx_max = \"wide\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_load_or_default_and_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent_grid.toml");
        assert_eq!(Config::load_or_default(&path).unwrap(), Config::default());

        let mut config = Config::default();
        config.tick.seed = Some(7);
        config.model.provider = ModelProvider::Scripted;
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();

        assert_eq!(Config::load_or_default(&path).unwrap(), config);
    }
}
