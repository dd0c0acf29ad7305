pub mod agent;
pub mod bedrock;
pub mod config;
pub mod images;
pub mod prompts;
pub mod text;
pub mod transport;

#[cfg(test)]
mod test_support;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use shopgen_contracts::catalog::{load_products, Product};
use shopgen_contracts::error::AssetError;
use shopgen_contracts::events::{EventPayload, EventWriter};
use shopgen_contracts::models::{ModelSelector, IMAGE, TEXT};
use shopgen_contracts::providers::ProviderRegistry;
use shopgen_contracts::runs::manifest::{
    image_file_name, write_manifest, GeneratedAsset, IMAGES_DIR_NAME,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::{AgentImageProvider, CommandAgent};
use crate::bedrock::BedrockRuntime;
use crate::config::{ImageSource, PipelineConfig};
use crate::images::{
    sha256_hex, BedrockImageProvider, DryrunImageProvider, ImageProvider, ImageRequest,
};
use crate::prompts::{build_copy_prompt, build_description, build_image_prompt};
use crate::text::{
    BedrockTextProvider, DryrunTextProvider, MistralTextProvider, TextProvider, TextRequest,
};
use crate::transport::build_http_client;

pub const EVENTS_FILE_NAME: &str = "events.jsonl";

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub manifest_path: PathBuf,
    pub events_path: PathBuf,
    pub assets: Vec<GeneratedAsset>,
}

/// Turns a product catalog into descriptions and images, one product at a
/// time, and writes the manifest once every product has succeeded.
pub struct AssetPipeline {
    config: PipelineConfig,
    selector: ModelSelector,
    text_providers: ProviderRegistry<dyn TextProvider>,
    image_providers: ProviderRegistry<dyn ImageProvider>,
}

struct ResolvedText<'a> {
    provider: &'a dyn TextProvider,
    model: String,
}

struct ResolvedImage<'a> {
    provider: &'a dyn ImageProvider,
    model: String,
    dir: PathBuf,
}

impl AssetPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let http = build_http_client(config.timeout)?;
        let runtime = BedrockRuntime::from_env(&config.region, http.clone());
        debug!(
            endpoint = runtime.endpoint(),
            auth = runtime.auth_kind(),
            "bedrock runtime configured"
        );

        let mut text_providers: ProviderRegistry<dyn TextProvider> = ProviderRegistry::new();
        text_providers.register(Box::new(BedrockTextProvider::new(runtime.clone())));
        text_providers.register(Box::new(MistralTextProvider::from_env(http)));
        text_providers.register(Box::new(DryrunTextProvider));

        let mut image_providers: ProviderRegistry<dyn ImageProvider> = ProviderRegistry::new();
        image_providers.register(Box::new(BedrockImageProvider::new(runtime)));
        image_providers.register(Box::new(DryrunImageProvider));
        if config.generate_images && config.image.source == ImageSource::Agent {
            if let Some(command) = config.image.agent_command.as_deref() {
                let agent = CommandAgent::parse(command)?;
                image_providers.register(Box::new(AgentImageProvider::new(Box::new(agent))));
            }
        }

        Self::with_providers(config, text_providers, image_providers)
    }

    pub fn with_providers(
        config: PipelineConfig,
        text_providers: ProviderRegistry<dyn TextProvider>,
        image_providers: ProviderRegistry<dyn ImageProvider>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            selector: ModelSelector::new(None),
            text_providers,
            image_providers,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Loads the catalog at `path`, then runs. A catalog that cannot be read
    /// or parsed fails before anything is written.
    pub fn run_catalog(&self, path: &Path) -> Result<RunOutcome> {
        let products = load_products(path)?;
        info!(catalog = %path.display(), products = products.len(), "catalog loaded");
        self.execute(&products, Some(path))
    }

    pub fn run(&self, products: &[Product]) -> Result<RunOutcome> {
        self.execute(products, None)
    }

    fn execute(&self, products: &[Product], catalog: Option<&Path>) -> Result<RunOutcome> {
        fs::create_dir_all(&self.config.out_dir)
            .with_context(|| format!("failed to create {}", self.config.out_dir.display()))?;
        let out_dir = fs::canonicalize(&self.config.out_dir)
            .with_context(|| format!("failed to resolve {}", self.config.out_dir.display()))?;
        let run_id = format!("run-{}", Uuid::new_v4());
        let events_path = self
            .config
            .events_path
            .clone()
            .unwrap_or_else(|| out_dir.join(EVENTS_FILE_NAME));
        let events = EventWriter::new(events_path.clone(), run_id.clone());

        events.emit(
            "run_started",
            payload(json!({
                "out_dir": out_dir.to_string_lossy(),
                "model_text": self.config.model_text,
                "generate_images": self.config.generate_images,
                "text_model": self.config.model_text.then(|| self.config.text.model.clone()),
                "image_model": self.config.generate_images.then(|| self.config.image.model.clone()),
            })),
        )?;
        info!(%run_id, out_dir = %out_dir.display(), "run started");

        match self.produce(products, catalog, &out_dir, &events) {
            Ok((manifest_path, assets)) => Ok(RunOutcome {
                run_id,
                manifest_path,
                events_path,
                assets,
            }),
            Err(err) => {
                let model = err
                    .downcast_ref::<AssetError>()
                    .and_then(AssetError::model)
                    .map(str::to_string);
                if let Err(emit_err) = events.emit(
                    "run_failed",
                    payload(json!({
                        "error": format!("{err:#}"),
                        "model": model,
                    })),
                ) {
                    warn!("failed to record run_failed event: {emit_err:#}");
                }
                Err(err)
            }
        }
    }

    fn produce(
        &self,
        products: &[Product],
        catalog: Option<&Path>,
        out_dir: &Path,
        events: &EventWriter,
    ) -> Result<(PathBuf, Vec<GeneratedAsset>)> {
        events.emit(
            "catalog_loaded",
            payload(json!({
                "source": catalog.map(|path| path.to_string_lossy().to_string()),
                "products": products.len(),
            })),
        )?;

        let text = if self.config.model_text {
            Some(self.resolve_text()?)
        } else {
            None
        };
        let image = if self.config.generate_images {
            Some(self.resolve_image(out_dir)?)
        } else {
            None
        };

        let mut assets = Vec::with_capacity(products.len());
        for product in products {
            let (description, source) = match &text {
                Some(resolved) => {
                    let request = TextRequest {
                        model: resolved.model.clone(),
                        prompt: build_copy_prompt(product),
                        temperature: self.config.text.temperature,
                        max_tokens: self.config.text.max_tokens,
                    };
                    (resolved.provider.generate(&request)?, resolved.provider.name())
                }
                None => (build_description(product), "template"),
            };
            events.emit(
                "description_generated",
                payload(json!({
                    "id": product.id,
                    "source": source,
                    "chars": description.chars().count(),
                })),
            )?;
            debug!(id = %product.id, source, "description ready");

            let image_path = match &image {
                Some(resolved) => Some(self.write_product_image(product, resolved, events)?),
                None => None,
            };

            assets.push(GeneratedAsset {
                id: product.id.clone(),
                name: product.name.clone(),
                description,
                image: image_path,
            });
        }

        let manifest_path = write_manifest(out_dir, &assets)?;
        events.emit(
            "manifest_written",
            payload(json!({
                "path": manifest_path.to_string_lossy(),
                "entries": assets.len(),
            })),
        )?;
        let images = assets.iter().filter(|asset| asset.image.is_some()).count();
        events.emit(
            "run_finished",
            payload(json!({
                "products": assets.len(),
                "images": images,
            })),
        )?;
        info!(
            manifest = %manifest_path.display(),
            products = assets.len(),
            images,
            "run finished"
        );
        Ok((manifest_path, assets))
    }

    fn resolve_text(&self) -> Result<ResolvedText<'_>> {
        let selection = self
            .selector
            .select(&self.config.text.model, TEXT)
            .map_err(anyhow::Error::msg)?;
        if let Some(note) = &selection.note {
            warn!("{note}");
        }
        let provider = self
            .text_providers
            .get(&selection.model.provider)
            .with_context(|| {
                format!(
                    "no text provider '{}' for model '{}'",
                    selection.model.provider, selection.model.name
                )
            })?;
        info!(model = %selection.model.name, provider = provider.name(), "text model selected");
        Ok(ResolvedText {
            provider,
            model: selection.model.name,
        })
    }

    fn resolve_image(&self, out_dir: &Path) -> Result<ResolvedImage<'_>> {
        let provider_name = match self.config.image.source {
            ImageSource::Agent => "agent".to_string(),
            ImageSource::Direct => {
                let selection = self
                    .selector
                    .select(&self.config.image.model, IMAGE)
                    .map_err(anyhow::Error::msg)?;
                if let Some(note) = &selection.note {
                    warn!("{note}");
                }
                selection.model.provider
            }
        };
        let provider = self
            .image_providers
            .get(&provider_name)
            .with_context(|| {
                format!(
                    "no image provider '{provider_name}' for model '{}'",
                    self.config.image.model
                )
            })?;
        let dir = out_dir.join(IMAGES_DIR_NAME);
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        info!(model = %self.config.image.model, provider = provider.name(), "image provider selected");
        Ok(ResolvedImage {
            provider,
            model: self.config.image.model.trim().to_string(),
            dir,
        })
    }

    fn write_product_image(
        &self,
        product: &Product,
        resolved: &ResolvedImage<'_>,
        events: &EventWriter,
    ) -> Result<String> {
        let settings = &self.config.image;
        let request = ImageRequest {
            model: resolved.model.clone(),
            prompt: build_image_prompt(product),
            width: settings.width,
            height: settings.height,
            quality: settings.quality.clone(),
            cfg_scale: settings.cfg_scale,
        };
        let target = resolved.dir.join(image_file_name(&product.id));
        resolved.provider.generate(&request, &target)?;
        let bytes = fs::read(&target)
            .map_err(|err| AssetError::MissingAsset(format!("{}: {err}", target.display())))?;
        events.emit(
            "image_written",
            payload(json!({
                "id": product.id,
                "path": target.to_string_lossy(),
                "bytes": bytes.len(),
                "sha256": sha256_hex(&bytes),
                "provider": resolved.provider.name(),
            })),
        )?;
        Ok(target.to_string_lossy().to_string())
    }
}

fn payload(value: Value) -> EventPayload {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
