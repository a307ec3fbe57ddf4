use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::error::BridgeError;
use crate::session::{SessionConfig, DEFAULT_MODEL};

pub const DEFAULT_ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub voice: Option<String>,
    pub connect_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            voice: None,
            connect_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
    pub frame_size: usize,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: 16000,
            playback_sample_rate: 24000,
            frame_size: 4096,
            input_device: None,
            output_device: None,
        }
    }
}

impl Config {
    /// Load `path` (any format the `config` crate knows, extension optional)
    /// then apply `LIVE_BRIDGE__SECTION__KEY` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("LIVE_BRIDGE").separator("__"))
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let cfg: Self = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> std::result::Result<(), BridgeError> {
        if self.audio.capture_sample_rate == 0 || self.audio.playback_sample_rate == 0 {
            return Err(BridgeError::Config("sample rates must be non-zero".to_string()));
        }
        if self.audio.frame_size == 0 {
            return Err(BridgeError::Config("frame size must be non-zero".to_string()));
        }
        if self.service.endpoint.is_empty() {
            return Err(BridgeError::Config("service endpoint is empty".to_string()));
        }
        Ok(())
    }

    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> std::result::Result<String, BridgeError> {
        std::env::var(&self.service.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                BridgeError::Config(format!(
                    "API key missing: set the {} environment variable",
                    self.service.api_key_env
                ))
            })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.service.connect_timeout_secs)
    }

    /// Session-level settings derived from this configuration
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model: self.service.model.clone(),
            voice: self.service.voice.clone(),
            capture_sample_rate: self.audio.capture_sample_rate,
            playback_sample_rate: self.audio.playback_sample_rate,
            frame_size: self.audio.frame_size,
            input_device: self.audio.input_device.clone(),
            connect_timeout: self.connect_timeout(),
            ..SessionConfig::default()
        }
    }
}
