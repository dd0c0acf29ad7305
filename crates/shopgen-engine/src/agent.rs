//! Image generation delegated to an external tool-using agent.
//!
//! The agent is asked for one image and must answer with the path of the file
//! it produced. Pulling a path out of free text is inherently fuzzy, so this
//! provider is only used when explicitly selected.

use std::env;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Serialize;
use shopgen_contracts::error::AssetError;
use shopgen_contracts::providers::NamedProvider;

use crate::images::{ensure_png, write_image, ImageProvider, ImageRequest};
use crate::transport::truncate_text;

pub const AGENT_SYSTEM_PROMPT: &str = "You generate exactly one image from the prompt. Return ONLY a single filesystem path to the generated image.";
pub const IMAGE_TOOL: &str = "generate_image";

/// A drive-letter or bare path ending in `.png`.
pub const PNG_PATH_PATTERN: &str = r"([A-Za-z]:[^\s,]+\.png|[^\s,]+\.png)";

static PNG_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PNG_PATH_PATTERN).expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentRequest {
    pub system_prompt: String,
    pub tools: Vec<String>,
    pub prompt: String,
}

impl AgentRequest {
    pub fn for_image(prompt: &str) -> Self {
        Self {
            system_prompt: AGENT_SYSTEM_PROMPT.to_string(),
            tools: vec![IMAGE_TOOL.to_string()],
            prompt: prompt.to_string(),
        }
    }
}

pub trait AgentRunner: Send + Sync {
    /// Identifies the agent in errors, in place of a model id.
    fn label(&self) -> String;
    fn ask(&self, request: &AgentRequest) -> Result<String>;
}

/// Runs an agent as a child process: the request goes to stdin as JSON, the
/// reply is whatever the process prints to stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAgent {
    program: String,
    args: Vec<String>,
}

impl CommandAgent {
    pub fn parse(command_line: &str) -> Result<Self> {
        let mut parts = shell_words::split(command_line)
            .with_context(|| format!("invalid agent command: {command_line}"))?
            .into_iter();
        let Some(program) = parts.next().filter(|value| !value.trim().is_empty()) else {
            bail!("agent command is empty");
        };
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl AgentRunner for CommandAgent {
    fn label(&self) -> String {
        format!("agent:{}", self.program)
    }

    fn ask(&self, request: &AgentRequest) -> Result<String> {
        let payload = serde_json::to_vec(request)?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to start agent command '{}'", self.program))?;
        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&payload) {
                Err(err) if err.kind() != ErrorKind::BrokenPipe => {
                    return Err(err).context("failed to send request to agent");
                }
                _ => {}
            }
        }
        let output = child
            .wait_with_output()
            .context("failed waiting for agent command")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "agent command exited with {}: {}",
                output.status,
                truncate_text(stderr.trim(), 512)
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

pub struct AgentImageProvider {
    runner: Box<dyn AgentRunner>,
}

impl AgentImageProvider {
    pub fn new(runner: Box<dyn AgentRunner>) -> Self {
        Self { runner }
    }
}

impl NamedProvider for AgentImageProvider {
    fn name(&self) -> &str {
        "agent"
    }
}

impl ImageProvider for AgentImageProvider {
    fn generate(&self, request: &ImageRequest, target: &Path) -> Result<()> {
        let label = self.runner.label();
        let reply = self
            .runner
            .ask(&AgentRequest::for_image(&request.prompt))
            .map_err(|err| AssetError::generation(&label, err))?;
        let raw = extract_png_path(&reply).ok_or_else(|| {
            AssetError::MissingAsset(format!(
                "agent reply did not contain a PNG path: {}",
                truncate_text(reply.trim(), 200)
            ))
        })?;
        let source = resolve_reply_path(&raw)?;
        let bytes =
            fs::read(&source).with_context(|| format!("failed to read {}", source.display()))?;
        let png = ensure_png(bytes).map_err(|err| {
            AssetError::generation(&label, err.context(source.display().to_string()))
        })?;
        write_image(target, &png)
    }
}

/// First `*.png` path in `reply`, drive-letter or bare.
pub fn extract_png_path(reply: &str) -> Option<String> {
    let found = PNG_PATH_RE.find(reply)?.as_str();
    let trimmed = found.trim_start_matches(['"', '\'', '`', '(', '<', '[']);
    Some(trimmed.to_string()).filter(|value| value.len() > ".png".len())
}

fn resolve_reply_path(raw: &str) -> Result<PathBuf, AssetError> {
    let expanded = expand_home(raw);
    fs::canonicalize(&expanded).map_err(|err| {
        AssetError::MissingAsset(format!(
            "agent image path does not exist: {} ({err})",
            expanded.display()
        ))
    })
}

fn expand_home(raw: &str) -> PathBuf {
    let home = env::var_os("HOME").map(PathBuf::from);
    match (raw.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with(['/', '\\']) => home.join(&rest[1..]),
        _ => PathBuf::from(raw),
    }
}
