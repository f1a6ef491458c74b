use crate::error::{AssistantError, Result};
use crate::hotkey::parse_hotkey;
use crate::models::catalog::{default_catalog, ModelCatalogEntry, ModelSource, ModelType};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Config {
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub wakeword: WakeWordConfig,
    #[serde(default)]
    pub hotkey: HotkeyConfig,
    #[serde(default = "default_models")]
    pub models: Vec<ModelEntryConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct LifecycleConfig {
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    #[serde(default = "default_server_binary")]
    pub server_binary: String,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct WakeWordConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    pub device: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct HotkeyConfig {
    #[serde(default = "default_shortcut")]
    pub shortcut: String,
}

/// One `[[models]]` table
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ModelEntryConfig {
    pub model_type: String,
    pub model_id: String,
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

// Default value functions
fn default_idle_timeout_secs() -> u64 {
    3600
}
fn default_context_window() -> u32 {
    2048
}
fn default_server_binary() -> String {
    "llama-server".to_string()
}
fn default_startup_timeout_secs() -> u64 {
    120
}
fn default_true() -> bool {
    true
}
fn default_threshold() -> f32 {
    0.5
}
fn default_sample_rate() -> u32 {
    16000
}
fn default_chunk_size() -> usize {
    1280
}
fn default_throttle_ms() -> u64 {
    10
}
fn default_shortcut() -> String {
    "<cmd>+<shift>+<space>".to_string()
}
fn default_models() -> Vec<ModelEntryConfig> {
    default_catalog().iter().map(ModelEntryConfig::from).collect()
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            context_window: default_context_window(),
            server_binary: default_server_binary(),
            startup_timeout_secs: default_startup_timeout_secs(),
        }
    }
}

impl LifecycleConfig {
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

impl Default for WakeWordConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            threshold: default_threshold(),
            sample_rate: default_sample_rate(),
            chunk_size: default_chunk_size(),
            throttle_ms: default_throttle_ms(),
            device: None,
        }
    }
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            shortcut: default_shortcut(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleConfig::default(),
            wakeword: WakeWordConfig::default(),
            hotkey: HotkeyConfig::default(),
            models: default_models(),
        }
    }
}

impl From<&ModelCatalogEntry> for ModelEntryConfig {
    fn from(entry: &ModelCatalogEntry) -> Self {
        let (model_path, repo_id, filename) = match &entry.source {
            ModelSource::Local { path } => (Some(path.clone()), None, None),
            ModelSource::Remote(remote) => (
                None,
                Some(remote.repo_id.clone()),
                Some(remote.filename.clone()),
            ),
        };

        Self {
            model_type: entry.model_type.to_string(),
            model_id: entry.model_id.clone(),
            model_name: entry.display_name.clone(),
            model_path,
            repo_id,
            filename,
        }
    }
}

impl TryFrom<&ModelEntryConfig> for ModelCatalogEntry {
    type Error = AssistantError;

    fn try_from(cfg: &ModelEntryConfig) -> Result<Self> {
        let model_type: ModelType = cfg.model_type.parse()?;

        match (&cfg.model_path, &cfg.repo_id, &cfg.filename) {
            (None, Some(repo_id), Some(filename)) => Ok(Self::remote(
                model_type,
                &cfg.model_id,
                &cfg.model_name,
                repo_id,
                filename,
            )),
            (Some(path), None, None) => Ok(Self::local(
                model_type,
                &cfg.model_id,
                &cfg.model_name,
                path,
            )),
            _ => Err(AssistantError::Config(format!(
                "Model '{}' must set either model_path or both repo_id and filename",
                cfg.model_id
            ))),
        }
    }
}

impl Config {
    /// Catalog entries in configuration order
    pub fn catalog(&self) -> Result<Vec<ModelCatalogEntry>> {
        self.models.iter().map(ModelCatalogEntry::try_from).collect()
    }

    /// Check value ranges and cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.wakeword.threshold) {
            return Err(AssistantError::Config(format!(
                "Invalid wake word threshold: {} (must be between 0.0 and 1.0)",
                self.wakeword.threshold
            )));
        }

        if self.wakeword.chunk_size == 0 || self.wakeword.sample_rate == 0 {
            return Err(AssistantError::Config(
                "wakeword.chunk_size and wakeword.sample_rate must be non-zero".to_string(),
            ));
        }

        if self.lifecycle.context_window == 0 {
            return Err(AssistantError::Config(
                "lifecycle.context_window must be non-zero".to_string(),
            ));
        }

        parse_hotkey(&self.hotkey.shortcut)?;

        let catalog = self.catalog()?;
        for (i, entry) in catalog.iter().enumerate() {
            if catalog[..i].iter().any(|m| m.model_id == entry.model_id) {
                return Err(AssistantError::Config(format!(
                    "Duplicate model id '{}' in [[models]]",
                    entry.model_id
                )));
            }
        }

        Ok(())
    }
}
