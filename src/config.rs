//! Generator configuration: TOML file plus environment.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const TOKEN_ENV: &str = "REPLICATE_API_TOKEN";

/// Parameters sent as the prediction `input`, next to the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelInput {
    pub go_fast: bool,
    pub megapixels: String,
    pub num_outputs: u32,
    pub aspect_ratio: String,
    pub output_format: String,
    pub output_quality: u32,
    pub num_inference_steps: u32,
}

impl Default for ModelInput {
    fn default() -> Self {
        Self {
            go_fast: true,
            megapixels: "1".to_string(),
            num_outputs: 1,
            aspect_ratio: "1:1".to_string(),
            output_format: "webp".to_string(),
            output_quality: 80,
            num_inference_steps: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    pub api_token: Option<String>,
    pub base_url: String,
    pub model: String,
    pub output_dir: PathBuf,
    /// Tera template replacing the built-in prompt.
    pub template: Option<PathBuf>,
    pub timeout_s: u64,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
    pub input: ModelInput,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            base_url: "https://api.replicate.com/v1".to_string(),
            model: "black-forest-labs/flux-schnell".to_string(),
            output_dir: PathBuf::from("TextureOutput"),
            template: None,
            timeout_s: 120,
            poll_interval_ms: 1000,
            max_polls: 120,
            input: ModelInput::default(),
        }
    }
}

impl GeneratorConfig {
    /// Defaults, then the TOML file at `path` (if any), then `REPLICATE_API_TOKEN`
    /// when the file left the token unset.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config: {}", path.display()))?;
                let config = Self::from_toml(&raw)
                    .with_context(|| format!("Invalid config: {}", path.display()))?;
                info!("Loaded configuration from {}", path.display());
                config
            }
            None => Self::default(),
        };

        config.fill_token(std::env::var(TOKEN_ENV).ok());
        Ok(config)
    }

    /// Blank tokens count as unset, so the environment still applies.
    fn fill_token(&mut self, env_token: Option<String>) {
        let blank = self
            .api_token
            .as_deref()
            .map_or(true, |token| token.trim().is_empty());
        if blank {
            self.api_token = env_token;
            debug!("API token taken from environment: {}", self.api_token.is_some());
        }
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse TOML configuration")
    }

    pub fn require_token(&self) -> Result<&str> {
        match self.api_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(token),
            _ => bail!("Please set {} or api_token in the config file", TOKEN_ENV),
        }
    }
}
