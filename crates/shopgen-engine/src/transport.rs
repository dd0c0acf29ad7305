use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub fn build_http_client(timeout: Duration) -> Result<HttpClient> {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .context("failed to build HTTP client")
}

pub fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<serde_json::Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    serde_json::from_str(&body).with_context(|| format!("{provider} returned invalid JSON payload"))
}

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn normalize_api_base(raw: &str) -> Option<String> {
    Some(raw.trim().trim_end_matches('/').to_string()).filter(|value| !value.is_empty())
}

pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_base_drops_trailing_slashes() {
        assert_eq!(
            normalize_api_base(" https://api.mistral.ai/v1/ "),
            Some("https://api.mistral.ai/v1".to_string())
        );
        assert_eq!(normalize_api_base("  "), None);
    }

    #[test]
    fn truncation_marks_cut_text() {
        assert_eq!(truncate_text("abcdef", 3), "abc…");
        assert_eq!(truncate_text("abc", 3), "abc");
    }
}
