//! Configuration management for ChainSign
//!
//! Settings come from `config.toml` when present, otherwise defaults. The
//! `DATA_DIR` and `PORT` environment variables override the file.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ChainError, Result};
use crate::miner::{Miner, DEFAULT_DIFFICULTY, DEFAULT_MAX_ATTEMPTS};
use crate::persistence::{InMemoryPersistence, JsonFilePersistence, Persistence, CHAIN_FILE_NAME};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Directory for the persisted chain. Memory-only when unset.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_file_name")]
    pub file_name: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            file_name: default_file_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u64,
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            max_attempts: default_max_attempts(),
            threads: default_threads(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory of a static dashboard served next to the API.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            static_dir: None,
        }
    }
}

fn default_file_name() -> String {
    CHAIN_FILE_NAME.to_string()
}

fn default_difficulty() -> u32 {
    DEFAULT_DIFFICULTY
}

fn default_max_attempts() -> u64 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_threads() -> usize {
    1
}

fn default_port() -> u16 {
    3000
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ChainError::Config(format!("Invalid config: {}", e)))
    }

    /// Apply `DATA_DIR` / `PORT` overrides read through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("DATA_DIR").filter(|d| !d.trim().is_empty()) {
            self.ledger.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.api.port = port;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=64).contains(&self.miner.difficulty) {
            return Err(ChainError::Config(format!(
                "miner.difficulty must be between 1 and 64, got {}",
                self.miner.difficulty
            )));
        }
        if self.miner.max_attempts == 0 {
            return Err(ChainError::Config("miner.max_attempts must be positive".to_string()));
        }
        if self.miner.threads == 0 {
            return Err(ChainError::Config("miner.threads must be positive".to_string()));
        }
        if self.ledger.file_name.trim().is_empty() {
            return Err(ChainError::Config("ledger.file_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Backend selected by `ledger.data_dir`.
    pub fn persistence(&self) -> Arc<dyn Persistence> {
        match &self.ledger.data_dir {
            Some(dir) => Arc::new(JsonFilePersistence::in_dir(dir, &self.ledger.file_name)),
            None => Arc::new(InMemoryPersistence::new()),
        }
    }

    pub fn build_miner(&self) -> Result<Miner> {
        Miner::with_threads(
            self.miner.difficulty,
            self.miner.max_attempts,
            self.miner.threads,
        )
    }
}

/// Load `config.toml` from the working directory, then apply env overrides.
pub fn load_config() -> Result<Config> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config> {
    let config_str = fs::read_to_string(path.as_ref()).unwrap_or_default();
    let mut config = if config_str.trim().is_empty() {
        // Provide sane defaults when config.toml is absent
        Config::default()
    } else {
        Config::from_toml(&config_str)?
    };

    config.apply_env_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.miner.difficulty, 2);
        assert_eq!(config.miner.threads, 1);
        assert_eq!(config.api.port, 3000);
        assert_eq!(config.ledger.file_name, CHAIN_FILE_NAME);
        assert!(config.ledger.data_dir.is_none());
        assert!(!config.persistence().is_durable());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = Config::from_toml(
            r#"
            [ledger]
            data_dir = "/var/lib/chainsign"

            [miner]
            difficulty = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.miner.difficulty, 3);
        assert_eq!(config.miner.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.ledger.data_dir, Some(PathBuf::from("/var/lib/chainsign")));
        assert!(config.persistence().is_durable());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| match key {
            "DATA_DIR" => Some("/tmp/ledger".to_string()),
            "PORT" => Some("8088".to_string()),
            _ => None,
        });
        assert_eq!(config.ledger.data_dir, Some(PathBuf::from("/tmp/ledger")));
        assert_eq!(config.api.port, 8088);

        let mut untouched = Config::default();
        untouched.apply_env_overrides(|key| (key == "PORT").then(|| "not-a-port".to_string()));
        assert_eq!(untouched.api.port, 3000);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.miner.difficulty = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.miner.difficulty = 65;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.miner.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ChainError::Config(_))));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        assert!(matches!(
            Config::from_toml("[miner]\ndifficulty = \"hard\""),
            Err(ChainError::Config(_))
        ));
    }
}
