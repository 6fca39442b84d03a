use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub limits: LimitsConfig,
    pub audio: AudioConfig,
    pub deck: DeckConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Reject input payloads above this many bytes before staging.
    pub max_input_bytes: u64,
    /// Cap on simultaneously running converter subprocesses.
    pub max_concurrent_conversions: usize,
    /// Timeout for a single converter invocation, in seconds.
    pub convert_timeout_seconds: u64,
    /// Timeout for the thumbnail upload, in seconds.
    pub upload_timeout_seconds: u64,
    /// Override for the workspace root; defaults to the system temp dir.
    pub temp_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Path to the audio resampler executable.
    pub ffmpeg_path: Option<String>,
    /// Path to the speech-to-text executable.
    pub whisper_path: Option<String>,
    /// Path to the speech-to-text model file.
    pub model_path: Option<String>,
    pub language: Option<String>,
    /// Target sample rate for the resample step.
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckConfig {
    /// Path to the document-to-image converter executable.
    pub converter_path: Option<String>,
    /// Arguments inserted before the staged deck path.
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Pre-authorized base URL for the object store; key is appended.
    pub base_url: Option<String>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: 100 * 1024 * 1024,
            max_concurrent_conversions: 2,
            convert_timeout_seconds: 600,
            upload_timeout_seconds: 120,
            temp_root: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: Some("ffmpeg".to_string()),
            whisper_path: Some("whisper-cli".to_string()),
            model_path: None,
            language: Some("en".to_string()),
            sample_rate: 16000,
        }
    }
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            converter_path: Some("deck2png".to_string()),
            extra_args: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { base_url: None }
    }
}

impl LimitsConfig {
    pub fn convert_timeout(&self) -> Duration {
        Duration::from_secs(self.convert_timeout_seconds)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_seconds)
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(global::temp_root)
    }
}

impl PipelineConfig {
    pub fn load() -> Result<Self> {
        let config_path = global::config_file()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = global::config_file()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }
}
