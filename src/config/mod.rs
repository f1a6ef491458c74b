//! Configuration module for llama-assistant
//!
//! Loads config from `$XDG_CONFIG_HOME/llama-assistant/config.toml` or
//! `~/.config/llama-assistant/config.toml`.
//! Falls back to embedded defaults if file doesn't exist.
//! Partial configs are merged with defaults using serde's default attributes.
//!
//! # Example
//!
//! ```no_run
//! use llama_assistant::config::Config;
//!
//! let config = Config::load().expect("Failed to load config");
//! println!("Idle timeout: {}s", config.lifecycle.idle_timeout_secs);
//! println!("Wake word threshold: {}", config.wakeword.threshold);
//! ```

pub mod schema;

pub use schema::{Config, HotkeyConfig, LifecycleConfig, ModelEntryConfig, WakeWordConfig};

use crate::error::{AssistantError, Result};
use std::fs;
use std::path::{Path, PathBuf};

impl Config {
    /// Load from the default location, or defaults if there is no file
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load and validate a specific config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            AssistantError::Config(format!("Failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write to `path` atomically (tmp + rename)
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| AssistantError::Config(format!("Failed to serialize config: {e}")))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, toml_str)?;
        fs::rename(&tmp_path, path)?;

        Ok(())
    }
}

/// Default config file location
pub fn config_path() -> Result<PathBuf> {
    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::config_dir()
            .ok_or_else(|| AssistantError::Config("Cannot determine config directory".to_string()))?,
    };

    Ok(base.join("llama-assistant").join("config.toml"))
}
