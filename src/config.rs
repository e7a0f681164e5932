//! Configuration management with validation and defaults
//!
//! Every tunable of the round engine lives here so that product
//! parameters (growth curve, house edge, bet limits) are configuration
//! rather than code.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top-level configuration for the crashwave server.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashwaveConfig {
    pub game: GameConfig,
    pub fairness: FairnessConfig,
    pub ledger: LedgerConfig,
    pub server: ServerConfig,
    pub monitoring: MonitoringConfig,
}

/// Round timing and bet limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub min_bet: u64,
    pub max_bet: u64,
    /// Length of the WAITING phase during which bets are accepted.
    pub betting_window_ms: u64,
    /// Pause between a crash and the next betting window.
    pub cooldown_ms: u64,
    /// Broadcast cadence for multiplier updates while RUNNING.
    pub tick_interval_ms: u64,
    /// Time constant of the exponential growth curve; the displayed
    /// multiplier is e^(elapsed / tau).
    pub growth_tau_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_bet: 10,
            max_bet: 1_000,
            betting_window_ms: 10_000,
            cooldown_ms: 2_000,
            tick_interval_ms: 100,
            growth_tau_ms: 5_000,
        }
    }
}

/// Provably-fair crash point parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FairnessConfig {
    /// Probability mass reserved for the house; also the instant-bust
    /// probability. Must be in [0, 1).
    pub house_edge: f64,
    /// Upper clamp on the crash point, in multiplier hundredths
    /// (1_000_000 = 10000.00x).
    pub max_multiplier_hundredths: u64,
    /// Public client seed mixed into every round's crash point. Rotating
    /// it only affects rounds started after the change.
    pub client_seed: String,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            house_edge: 0.01,
            max_multiplier_hundredths: 1_000_000,
            client_seed: "crashwave-public-seed-v1".to_string(),
        }
    }
}

/// Balance ledger parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Coins credited to an account the first time a player is seen.
    pub starting_balance: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            starting_balance: 1_000,
        }
    }
}

/// HTTP/WebSocket server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; `*` allows all.
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

/// Monitoring and metrics configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enable_metrics: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
        }
    }
}

impl CrashwaveConfig {
    /// Short phases for tests and local demos.
    pub fn fast_rounds() -> Self {
        Self {
            game: GameConfig {
                betting_window_ms: 200,
                cooldown_ms: 100,
                tick_interval_ms: 20,
                growth_tau_ms: 400,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for logical consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.game.min_bet == 0 || self.game.min_bet > self.game.max_bet {
            return Err(ConfigError::InvalidValue(
                "min_bet must be > 0 and <= max_bet".to_string(),
            ));
        }
        if self.game.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "tick_interval_ms must be > 0".to_string(),
            ));
        }
        if self.game.growth_tau_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "growth_tau_ms must be > 0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.fairness.house_edge) {
            return Err(ConfigError::InvalidValue(
                "house_edge must be in [0, 1)".to_string(),
            ));
        }
        if self.fairness.max_multiplier_hundredths < 100 {
            return Err(ConfigError::InvalidValue(
                "max_multiplier_hundredths must be at least 100 (1.00x)".to_string(),
            ));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "request_timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl GameConfig {
    pub fn betting_window(&self) -> Duration {
        Duration::from_millis(self.betting_window_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn growth_tau(&self) -> Duration {
        Duration::from_millis(self.growth_tau_ms)
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("failed to load configuration: {0}")]
    LoadFailed(String),
}
