use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::transport::{non_empty_env, DEFAULT_TIMEOUT};

pub const DEFAULT_TEXT_MODEL: &str = "us.anthropic.claude-sonnet-4-20250514-v1:0";
pub const DEFAULT_IMAGE_MODEL: &str = "amazon.titan-image-generator-v2";
pub const DEFAULT_REGION: &str = "us-west-2";

pub const TEXT_MODEL_ENV: &str = "BEDROCK_TEXT_MODEL_ID";
pub const IMAGE_MODEL_ENV: &str = "BEDROCK_IMAGE_MODEL_ID";
pub const REGION_ENVS: [&str; 2] = ["AWS_REGION", "AWS_DEFAULT_REGION"];
pub const AGENT_COMMAND_ENV: &str = "SHOPGEN_AGENT_COMMAND";

/// Where product images come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageSource {
    /// The image model's own provider (Bedrock, or dry-run).
    #[default]
    Direct,
    /// An external agent with an image tool, reached through `agent_command`.
    Agent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for TextSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_TEXT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageSettings {
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub quality: String,
    pub cfg_scale: f64,
    pub source: ImageSource,
    pub agent_command: Option<String>,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_IMAGE_MODEL.to_string(),
            width: 1024,
            height: 1024,
            quality: "standard".to_string(),
            cfg_scale: 8.0,
            source: ImageSource::Direct,
            agent_command: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub out_dir: PathBuf,
    /// Defaults to `<out_dir>/events.jsonl`.
    pub events_path: Option<PathBuf>,
    pub model_text: bool,
    pub generate_images: bool,
    pub text: TextSettings,
    pub image: ImageSettings,
    pub region: String,
    pub timeout: Duration,
}

impl PipelineConfig {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            events_path: None,
            model_text: false,
            generate_images: false,
            text: TextSettings::default(),
            image: ImageSettings::default(),
            region: DEFAULT_REGION.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.model_text {
            if self.text.max_tokens == 0 {
                bail!("max tokens must be positive");
            }
            if !(0.0..=2.0).contains(&self.text.temperature) {
                bail!("temperature must be within 0.0..=2.0");
            }
        }
        if self.generate_images {
            if self.image.width == 0 || self.image.height == 0 {
                bail!(
                    "image size must be positive (got {}x{})",
                    self.image.width,
                    self.image.height
                );
            }
            if !self.image.cfg_scale.is_finite() || self.image.cfg_scale <= 0.0 {
                bail!("cfg scale must be a positive number");
            }
            if self.image.source == ImageSource::Agent && self.image.agent_command.is_none() {
                bail!("agent image source needs an agent command (--agent-command or {AGENT_COMMAND_ENV})");
            }
        }
        if self.timeout.is_zero() {
            bail!("timeout must be positive");
        }
        Ok(())
    }
}

/// First non-empty value of: `explicit`, then each of `env_keys`, then `default`.
pub fn resolve_setting(
    explicit: Option<&str>,
    env_keys: &[&str],
    default: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> String {
    resolve_optional(explicit, env_keys, lookup).unwrap_or_else(|| default.to_string())
}

pub fn resolve_optional(
    explicit: Option<&str>,
    env_keys: &[&str],
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    explicit
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| env_keys.iter().find_map(|key| lookup(*key)))
}

/// Process-environment lookup for [`resolve_setting`].
pub fn process_env(key: &str) -> Option<String> {
    non_empty_env(key)
}
