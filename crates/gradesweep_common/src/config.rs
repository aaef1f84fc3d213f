//! Configuration management for gradesweep.
//!
//! Loads settings from /etc/gradesweep/config.toml (or an explicit path)
//! or uses defaults. Every field has a serde default, so a partial file is
//! always valid.

use crate::error::{Result, SweepError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/gradesweep/config.toml";

/// Default state directory
pub const DEFAULT_STATE_DIR: &str = "/var/lib/gradesweep";

/// Search strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Sweep every option of one question at a time
    RotationSweep,
    /// Single-coordinate hill climbing with random restarts
    CoordinateAscent,
}

impl Default for StrategyKind {
    fn default() -> Self {
        Self::RotationSweep
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::RotationSweep => f.write_str("rotation_sweep"),
            StrategyKind::CoordinateAscent => f.write_str("coordinate_ascent"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "rotation_sweep" | "rotation" => Ok(Self::RotationSweep),
            "coordinate_ascent" | "ascent" | "greedy" => Ok(Self::CoordinateAscent),
            other => Err(SweepError::Config(format!("unknown strategy '{}'", other))),
        }
    }
}

/// Search behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Options per question when the surface does not report them
    #[serde(default = "default_options_per_question")]
    pub options_per_question: u8,

    /// Expected question count; sizes memory when `capacity` is unset
    #[serde(default)]
    pub question_count: Option<usize>,

    /// Store and log capacity; defaults to the question count
    #[serde(default)]
    pub capacity: Option<usize>,

    /// RNG seed for reproducible Coordinate Ascent runs
    #[serde(default)]
    pub seed: Option<u64>,

    /// Commit the first strict improvement instead of the best alternative
    #[serde(default)]
    pub accept_first_improvement: bool,

    /// Stop after this many rounds (unbounded when absent)
    #[serde(default)]
    pub max_rounds: Option<u64>,
}

fn default_options_per_question() -> u8 {
    4
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            options_per_question: default_options_per_question(),
            question_count: None,
            capacity: None,
            seed: None,
            accept_first_improvement: false,
            max_rounds: None,
        }
    }
}

impl SearchConfig {
    /// Capacity for a session with `question_count` questions.
    ///
    /// Never below the question count, so a live question is never evicted
    /// mid-round.
    pub fn capacity_for(&self, question_count: usize) -> usize {
        self.capacity
            .unwrap_or(question_count)
            .max(question_count)
            .max(1)
    }
}

/// Where state files live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_DIR)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Consecutive failed sessions before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_secs: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Give up after this many exhausted retry cycles (None: restart forever)
    #[serde(default)]
    pub max_restarts: Option<u32>,
}

fn default_max_attempts() -> u32 {
    8
}

fn default_initial_backoff() -> u64 {
    10
}

fn default_max_backoff() -> u64 {
    300
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_secs: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            max_restarts: None,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based): initial * 2^(attempt-1), capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let secs = self
            .initial_backoff_secs
            .saturating_mul(1u64 << exp)
            .min(self.max_backoff_secs);
        Duration::from_secs(secs)
    }
}

/// External assessment helper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// Helper program implementing enumerate/submit/reset/login
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    /// Per-call timeout; a graded submission takes tens of seconds
    #[serde(default = "default_surface_timeout")]
    pub timeout_secs: u64,

    /// Pause between rounds
    #[serde(default = "default_settle")]
    pub settle_secs: u64,
}

fn default_surface_timeout() -> u64 {
    600
}

fn default_settle() -> u64 {
    2
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout_secs: default_surface_timeout(),
            settle_secs: default_settle(),
        }
    }
}

/// Outbound notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub telegram_bot_token: Option<String>,

    #[serde(default)]
    pub telegram_chat_id: Option<String>,

    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,

    /// Send a status line after every round, not only on milestones
    #[serde(default)]
    pub every_round: bool,
}

fn default_notify_timeout() -> u64 {
    10
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            telegram_chat_id: None,
            timeout_secs: default_notify_timeout(),
            every_round: false,
        }
    }
}

impl NotifyConfig {
    pub fn telegram_enabled(&self) -> bool {
        self.telegram_bot_token.as_deref().map_or(false, |t| !t.is_empty())
            && self.telegram_chat_id.as_deref().map_or(false, |c| !c.is_empty())
    }
}

/// Default Ollama endpoint for answer priors
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// One model consulted for answer priors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorModel {
    pub name: String,

    /// Vote weight relative to the other models
    #[serde(default = "default_model_weight")]
    pub weight: f64,
}

fn default_model_weight() -> f64 {
    1.0
}

/// Starting answers suggested by local language models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_ollama_url")]
    pub url: String,

    #[serde(default = "default_prior_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub models: Vec<PriorModel>,
}

fn default_ollama_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}

fn default_prior_timeout() -> u64 {
    90
}

impl Default for PriorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_ollama_url(),
            timeout_secs: default_prior_timeout(),
            models: Vec::new(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub surface: SurfaceConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub prior: PriorConfig,
}

impl Config {
    /// Parse a config file, failing on IO or syntax errors
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| SweepError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load config, falling back to defaults when missing or invalid
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.unwrap_or_else(|| Path::new(CONFIG_PATH));
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::from_file(path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Invalid config ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SweepError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.search.strategy, StrategyKind::RotationSweep);
        assert_eq!(config.search.options_per_question, 4);
        assert_eq!(config.storage.state_dir, PathBuf::from("/var/lib/gradesweep"));
        assert_eq!(config.retry.max_attempts, 8);
        assert!(!config.notify.telegram_enabled());
    }

    #[test]
    fn test_parse_toml_with_defaults() {
        let toml_str = r#"
[search]
strategy = "coordinate_ascent"
seed = 42

[storage]
state_dir = "/tmp/gs"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.search.strategy, StrategyKind::CoordinateAscent);
        assert_eq!(config.search.seed, Some(42));
        assert_eq!(config.storage.state_dir, PathBuf::from("/tmp/gs"));
        // Missing fields fall back
        assert_eq!(config.search.options_per_question, 4);
        assert_eq!(config.surface.timeout_secs, 600);
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[search\nstrategy = ").unwrap();

        assert!(Config::from_file(&path).is_err());
        let config = Config::load(Some(&path));
        assert_eq!(config.search.strategy, StrategyKind::RotationSweep);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryConfig {
            max_attempts: 5,
            initial_backoff_secs: 10,
            max_backoff_secs: 60,
            max_restarts: None,
        };
        assert_eq!(retry.backoff(1), Duration::from_secs(10));
        assert_eq!(retry.backoff(2), Duration::from_secs(20));
        assert_eq!(retry.backoff(3), Duration::from_secs(40));
        assert_eq!(retry.backoff(4), Duration::from_secs(60));
        assert_eq!(retry.backoff(40), Duration::from_secs(60));
    }

    #[test]
    fn test_capacity_never_below_question_count() {
        let mut search = SearchConfig::default();
        assert_eq!(search.capacity_for(30), 30);
        search.capacity = Some(10);
        assert_eq!(search.capacity_for(30), 30);
        search.capacity = Some(50);
        assert_eq!(search.capacity_for(30), 50);
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("ascent".parse::<StrategyKind>().unwrap(), StrategyKind::CoordinateAscent);
        assert_eq!("Rotation-Sweep".parse::<StrategyKind>().unwrap(), StrategyKind::RotationSweep);
        assert!("annealing".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_telegram_enabled_requires_both() {
        let mut notify = NotifyConfig::default();
        notify.telegram_bot_token = Some("token".to_string());
        assert!(!notify.telegram_enabled());
        notify.telegram_chat_id = Some("123".to_string());
        assert!(notify.telegram_enabled());
    }

    #[test]
    fn test_prior_section() {
        let toml_str = r#"
[prior]
enabled = true

[[prior.models]]
name = "llama3.1:8b"
weight = 5.0

[[prior.models]]
name = "gemma2:9b"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.prior.enabled);
        assert_eq!(config.prior.url, DEFAULT_OLLAMA_URL);
        assert_eq!(config.prior.timeout_secs, 90);
        assert_eq!(config.prior.models.len(), 2);
        assert_eq!(config.prior.models[1].weight, 1.0);
        assert!(!Config::default().prior.enabled);
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let config = Config::default();
        let rendered = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.search.options_per_question, 4);
    }
}
