//! # Configuration Management Module
//!
//! All runtime settings for the PerkUP Runner backend live in a single TOML file.
//! Every field has a default so a freshly written `config.toml` is immediately usable
//! in development mode.
//!
//! ## Configuration Structure
//!
//! - [`ServerConfig`] - HTTP bind address, port, deployment environment, CORS
//! - [`TelegramConfig`] - bot token used to verify launch signatures
//! - [`StorageConfig`] - location of the sled database
//! - [`LoggingConfig`] - log level and optional log files
//! - [`AntiCheatConfig`] - plausibility bounds for reported game results
//! - [`CatalogConfig`] - the authoritative price list for characters and skins
//!
//! ## Usage
//!
//! ```rust,no_run
//! use perkup_runner::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Listening on {}:{}", config.server.bind, config.server.port);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 3000
//! environment = "production"
//!
//! [telegram]
//! bot_token = "123456:ABC..."
//!
//! [[catalog.items]]
//! kind = "skin"
//! id = "gold"
//! price = 100
//! ```
//!
//! ## Environment Integration
//!
//! `TELEGRAM_BOT_TOKEN` overrides `telegram.bot_token` so the secret does not have to be
//! committed to the file. Precedence: CLI args > Environment > Config file > Defaults.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::fs;

use crate::storage::ItemKind;

/// Environment variable that overrides the configured bot token.
pub const BOT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

/// Deployment mode. Only `Development` allows requests without a launch signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    #[serde(default)]
    pub environment: Environment,
    /// Allowed CORS origins. Empty means any origin.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Maximum age of `auth_date` accepted by the authenticator.
    #[serde(default = "default_max_auth_age_secs")]
    pub max_auth_age_secs: i64,
}

fn default_max_auth_age_secs() -> i64 {
    86_400
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub security_file: Option<String>,
}

/// Heuristic bounds applied to client-reported results.
///
/// Percentages are integers so the comparison never goes through floating point:
/// a score is too high when `score * 100 > duration * max_score_per_second * score_tolerance_percent`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AntiCheatConfig {
    #[serde(default = "default_max_score_per_second")]
    pub max_score_per_second: u64,
    #[serde(default = "default_score_tolerance_percent")]
    pub score_tolerance_percent: u64,
    #[serde(default = "default_min_distance_percent")]
    pub min_distance_percent: u64,
    #[serde(default = "default_max_multiplier")]
    pub max_multiplier: u32,
}

fn default_max_score_per_second() -> u64 {
    50
}

fn default_score_tolerance_percent() -> u64 {
    150
}

fn default_min_distance_percent() -> u64 {
    50
}

fn default_max_multiplier() -> u32 {
    5
}

impl Default for AntiCheatConfig {
    fn default() -> Self {
        Self {
            max_score_per_second: default_max_score_per_second(),
            score_tolerance_percent: default_score_tolerance_percent(),
            min_distance_percent: default_min_distance_percent(),
            max_multiplier: default_max_multiplier(),
        }
    }
}

/// One purchasable item and its price in coins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogItemConfig {
    pub kind: ItemKind,
    pub id: String,
    pub price: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogConfig {
    #[serde(default)]
    pub items: Vec<CatalogItemConfig>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        let item = |kind, id: &str, price| CatalogItemConfig {
            kind,
            id: id.to_string(),
            price,
        };
        Self {
            items: vec![
                item(ItemKind::Character, "default", 0),
                item(ItemKind::Character, "barista", 500),
                item(ItemKind::Character, "courier", 1200),
                item(ItemKind::Skin, "default", 0),
                item(ItemKind::Skin, "silver", 50),
                item(ItemKind::Skin, "gold", 100),
                item(ItemKind::Skin, "espresso", 300),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub telegram: TelegramConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub anticheat: AntiCheatConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl Config {
    /// Load configuration from a file and apply environment overrides.
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let mut config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        if let Ok(token) = std::env::var(BOT_TOKEN_ENV) {
            if !token.trim().is_empty() {
                config.telegram.bot_token = token.trim().to_string();
            }
        }

        config
            .validate()
            .map_err(|e| anyhow!("Invalid config file {}: {}", path, e))?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject configurations that would make the service insecure or ambiguous.
    pub fn validate(&self) -> Result<()> {
        if self.server.environment.is_production() && self.telegram.bot_token.trim().is_empty() {
            return Err(anyhow!(
                "telegram.bot_token must be set in production (or export {})",
                BOT_TOKEN_ENV
            ));
        }
        if self.telegram.max_auth_age_secs <= 0 {
            return Err(anyhow!("telegram.max_auth_age_secs must be positive"));
        }
        if self.anticheat.max_score_per_second == 0 {
            return Err(anyhow!("anticheat.max_score_per_second must be positive"));
        }
        let mut seen = HashSet::new();
        for item in &self.catalog.items {
            if !seen.insert((item.kind, item.id.as_str())) {
                return Err(anyhow!(
                    "duplicate catalog entry {}:{}",
                    item.kind.as_str(),
                    item.id
                ));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                bind: "0.0.0.0".to_string(),
                port: 3000,
                environment: Environment::Development,
                cors_allowed_origins: Vec::new(),
            },
            telegram: TelegramConfig {
                bot_token: String::new(),
                max_auth_age_secs: default_max_auth_age_secs(),
            },
            storage: StorageConfig {
                data_dir: "./data".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("perkup-runner.log".to_string()),
                security_file: Some("perkup-runner-security.log".to_string()),
            },
            anticheat: AntiCheatConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}
