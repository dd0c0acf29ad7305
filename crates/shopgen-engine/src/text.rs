use anyhow::{Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use shopgen_contracts::error::AssetError;
use shopgen_contracts::providers::NamedProvider;

use crate::bedrock::BedrockRuntime;
use crate::transport::{non_empty_env, normalize_api_base, response_json_or_error};

const ANTHROPIC_BEDROCK_VERSION: &str = "bedrock-2023-05-31";

#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Single-turn text generation. Implementations report every failure as an
/// [`AssetError`] tagged with the requested model.
pub trait TextProvider: NamedProvider + Send + Sync {
    fn generate(&self, request: &TextRequest) -> Result<String>;
}

pub struct BedrockTextProvider {
    runtime: BedrockRuntime,
}

impl BedrockTextProvider {
    pub fn new(runtime: BedrockRuntime) -> Self {
        Self { runtime }
    }

    pub fn request_body(request: &TextRequest) -> Value {
        json!({
            "anthropic_version": ANTHROPIC_BEDROCK_VERSION,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [{
                "role": "user",
                "content": [{"type": "text", "text": request.prompt}],
            }],
        })
    }
}

impl NamedProvider for BedrockTextProvider {
    fn name(&self) -> &str {
        "bedrock"
    }
}

impl TextProvider for BedrockTextProvider {
    fn generate(&self, request: &TextRequest) -> Result<String> {
        let payload = self
            .runtime
            .invoke(&request.model, &Self::request_body(request))
            .map_err(|err| AssetError::generation(&request.model, err))?;
        let text = payload
            .get("content")
            .and_then(Value::as_array)
            .and_then(|blocks| blocks.first())
            .and_then(|block| block.get("text"))
            .and_then(Value::as_str);
        Ok(non_empty_text(text, &request.model)?)
    }
}

pub struct MistralTextProvider {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl MistralTextProvider {
    pub fn from_env(http: HttpClient) -> Self {
        let api_base = non_empty_env("MISTRAL_API_BASE")
            .and_then(|value| normalize_api_base(&value))
            .unwrap_or_else(|| "https://api.mistral.ai/v1".to_string());
        Self::new(api_base, non_empty_env("MISTRAL_API_KEY"), http)
    }

    pub fn new(api_base: impl Into<String>, api_key: Option<String>, http: HttpClient) -> Self {
        Self {
            api_base: api_base.into(),
            api_key,
            http,
        }
    }

    pub fn request_body(request: &TextRequest) -> Value {
        json!({
            "model": request.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        })
    }

    fn chat(&self, request: &TextRequest) -> Result<Value> {
        let api_key = self
            .api_key
            .as_deref()
            .context("MISTRAL_API_KEY not set")?;
        let endpoint = format!("{}/chat/completions", self.api_base);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .json(&Self::request_body(request))
            .send()
            .with_context(|| format!("Mistral request failed ({endpoint})"))?;
        response_json_or_error("Mistral", response)
    }
}

impl NamedProvider for MistralTextProvider {
    fn name(&self) -> &str {
        "mistral"
    }
}

impl TextProvider for MistralTextProvider {
    fn generate(&self, request: &TextRequest) -> Result<String> {
        let payload = self
            .chat(request)
            .map_err(|err| AssetError::generation(&request.model, err))?;
        let text = payload
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.pointer("/message/content"))
            .and_then(Value::as_str);
        Ok(non_empty_text(text, &request.model)?)
    }
}

/// Offline stand-in that writes deterministic copy from the prompt's
/// `Name:` line.
pub struct DryrunTextProvider;

impl NamedProvider for DryrunTextProvider {
    fn name(&self) -> &str {
        "dryrun"
    }
}

impl TextProvider for DryrunTextProvider {
    fn generate(&self, request: &TextRequest) -> Result<String> {
        let subject = request
            .prompt
            .lines()
            .find_map(|line| line.strip_prefix("Name:"))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("This piece");
        Ok(format!(
            "{subject} pairs easy comfort with a clean, modern finish (drafted offline by {}).",
            request.model
        ))
    }
}

fn non_empty_text(text: Option<&str>, model: &str) -> Result<String, AssetError> {
    text.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AssetError::EmptyResult {
            model: model.to_string(),
            what: "text",
        })
}
