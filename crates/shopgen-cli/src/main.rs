use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use shopgen_contracts::catalog::load_products;
use shopgen_contracts::models::ModelRegistry;
use shopgen_engine::config::{
    process_env, resolve_optional, resolve_setting, ImageSettings, ImageSource, PipelineConfig,
    TextSettings, AGENT_COMMAND_ENV, DEFAULT_IMAGE_MODEL, DEFAULT_REGION, DEFAULT_TEXT_MODEL,
    IMAGE_MODEL_ENV, REGION_ENVS, TEXT_MODEL_ENV,
};
use shopgen_engine::prompts::preview;
use shopgen_engine::AssetPipeline;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "shopgen",
    version,
    about = "Generate storefront product descriptions and images"
)]
struct Cli {
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write product_descriptions.json (and optionally images) for a catalog.
    Generate(GenerateArgs),
    /// Print the prompts each product would produce, without calling a model.
    Preview(PreviewArgs),
    /// List registered models.
    Models,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    /// Path to the storefront's data.ts
    #[arg(long, default_value = "../state-client/app/data.ts")]
    data: PathBuf,
    /// Output folder for descriptions and images
    #[arg(long, default_value = "../state-client/generated-assets")]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Generate descriptions with the text model
    #[arg(long = "use-bedrock-text", alias = "model-text")]
    use_bedrock_text: bool,
    /// Generate one image per product
    #[arg(long)]
    generate_images: bool,
    #[arg(long, default_value_t = 1024)]
    width: u32,
    #[arg(long, default_value_t = 1024)]
    height: u32,
    #[arg(long, default_value = "standard")]
    quality: String,
    #[arg(long, default_value_t = 8.0)]
    cfg_scale: f64,
    #[arg(long, default_value_t = 0.7)]
    temperature: f64,
    #[arg(long, default_value_t = 200)]
    max_tokens: u32,
    #[arg(long)]
    text_model_id: Option<String>,
    #[arg(long)]
    image_model_id: Option<String>,
    #[arg(long, value_enum, default_value_t = ImageProviderArg::Bedrock)]
    image_provider: ImageProviderArg,
    /// Agent command line used with --image-provider agent
    #[arg(long)]
    agent_command: Option<String>,
    #[arg(long)]
    region: Option<String>,
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
}

#[derive(Debug, Parser)]
struct PreviewArgs {
    #[arg(long, default_value = "../state-client/app/data.ts")]
    data: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ImageProviderArg {
    #[value(alias = "direct")]
    Bedrock,
    #[value(alias = "strands")]
    Agent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LogConfig {
    level: String,
    format: LogFormat,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("shopgen error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&LogConfig {
        level: cli.log_level.clone(),
        format: cli.log_format,
    })?;
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Preview(args) => run_preview(args),
        Command::Models => run_models(),
    }
}

fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("invalid log level '{}'", config.level))?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init(),
    };
    installed.context("failed to initialise logging")
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let config = pipeline_config(&args, process_env);
    let pipeline = AssetPipeline::new(config)?;
    let outcome = pipeline.run_catalog(&args.data)?;
    info!(run_id = %outcome.run_id, events = %outcome.events_path.display(), "assets generated");
    println!(
        "Wrote {} ({} products)",
        outcome.manifest_path.display(),
        outcome.assets.len()
    );
    Ok(0)
}

fn run_preview(args: PreviewArgs) -> Result<i32> {
    let products = load_products(&args.data)?;
    println!("{}", serde_json::to_string_pretty(&preview(&products))?);
    Ok(0)
}

fn run_models() -> Result<i32> {
    let registry = ModelRegistry::default();
    for model in registry.list() {
        println!(
            "{:<48} {:<8} {}",
            model.name,
            model.provider,
            model.capabilities.join(",")
        );
    }
    Ok(0)
}

fn pipeline_config(args: &GenerateArgs, lookup: impl Fn(&str) -> Option<String>) -> PipelineConfig {
    let text = TextSettings {
        model: resolve_setting(
            args.text_model_id.as_deref(),
            &[TEXT_MODEL_ENV],
            DEFAULT_TEXT_MODEL,
            &lookup,
        ),
        temperature: args.temperature,
        max_tokens: args.max_tokens,
    };
    let image = ImageSettings {
        model: resolve_setting(
            args.image_model_id.as_deref(),
            &[IMAGE_MODEL_ENV],
            DEFAULT_IMAGE_MODEL,
            &lookup,
        ),
        width: args.width,
        height: args.height,
        quality: args.quality.clone(),
        cfg_scale: args.cfg_scale,
        source: match args.image_provider {
            ImageProviderArg::Bedrock => ImageSource::Direct,
            ImageProviderArg::Agent => ImageSource::Agent,
        },
        agent_command: resolve_optional(
            args.agent_command.as_deref(),
            &[AGENT_COMMAND_ENV],
            &lookup,
        ),
    };
    PipelineConfig {
        out_dir: args.out.clone(),
        events_path: args.events.clone(),
        model_text: args.use_bedrock_text,
        generate_images: args.generate_images,
        text,
        image,
        region: resolve_setting(args.region.as_deref(), &REGION_ENVS, DEFAULT_REGION, &lookup),
        timeout: Duration::from_secs(args.timeout_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_args(argv: &[&str]) -> GenerateArgs {
        let mut full = vec!["shopgen", "generate"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Command::Generate(args) => args,
            other => panic!("expected generate, got {other:?}"),
        }
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn generate_defaults_match_the_script() {
        let args = generate_args(&[]);
        assert_eq!(args.data, PathBuf::from("../state-client/app/data.ts"));
        assert_eq!(args.out, PathBuf::from("../state-client/generated-assets"));
        assert!(!args.use_bedrock_text);
        assert!(!args.generate_images);
        assert_eq!(args.image_provider, ImageProviderArg::Bedrock);

        let config = pipeline_config(&args, no_env);
        assert_eq!(config.text.model, DEFAULT_TEXT_MODEL);
        assert_eq!(config.image.model, DEFAULT_IMAGE_MODEL);
        assert_eq!(config.region, DEFAULT_REGION);
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[test]
    fn aliases_select_the_same_options() {
        let args = generate_args(&["--model-text", "--image-provider", "strands"]);
        assert!(args.use_bedrock_text);
        assert_eq!(args.image_provider, ImageProviderArg::Agent);
        let args = generate_args(&["--image-provider", "direct"]);
        assert_eq!(args.image_provider, ImageProviderArg::Bedrock);
    }

    #[test]
    fn flags_override_environment() {
        let env = |key: &str| match key {
            "BEDROCK_TEXT_MODEL_ID" => Some("anthropic.claude-3-5-haiku-20241022-v1:0".to_string()),
            "AWS_DEFAULT_REGION" => Some("eu-central-1".to_string()),
            "SHOPGEN_AGENT_COMMAND" => Some("strands-agent".to_string()),
            _ => None,
        };
        let args = generate_args(&[
            "--image-model-id",
            "amazon.nova-canvas-v1:0",
            "--image-provider",
            "agent",
            "--generate-images",
        ]);
        let config = pipeline_config(&args, env);
        assert_eq!(config.text.model, "anthropic.claude-3-5-haiku-20241022-v1:0");
        assert_eq!(config.image.model, "amazon.nova-canvas-v1:0");
        assert_eq!(config.region, "eu-central-1");
        assert_eq!(config.image.source, ImageSource::Agent);
        assert_eq!(config.image.agent_command.as_deref(), Some("strands-agent"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn global_log_flags_parse_after_subcommand() {
        let cli = Cli::parse_from(["shopgen", "models", "--log-format", "json", "--log-level", "debug"]);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn unknown_image_provider_is_rejected() {
        assert!(Cli::try_parse_from(["shopgen", "generate", "--image-provider", "dalle"]).is_err());
    }
}
