use indexmap::IndexMap;

pub const TEXT: &str = "text";
pub const IMAGE: &str = "image";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
}

impl ModelSpec {
    pub fn new(name: &str, provider: &str, capabilities: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
            capabilities: capabilities
                .iter()
                .map(|item| (*item).to_string())
                .collect(),
        }
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }
}

/// Provider for a model id the registry does not know.
pub fn infer_provider(model: &str) -> &'static str {
    let lowered = model.trim().to_ascii_lowercase();
    if lowered.starts_with("dryrun") {
        "dryrun"
    } else if lowered.starts_with("mistral.") {
        // Bedrock-hosted Mistral models.
        "bedrock"
    } else if lowered.contains("mistral") || lowered.contains("mixtral") {
        "mistral"
    } else {
        "bedrock"
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let rows: &[(&str, &str, &[&str])] = &[
        ("us.anthropic.claude-sonnet-4-20250514-v1:0", "bedrock", &[TEXT]),
        ("anthropic.claude-3-5-haiku-20241022-v1:0", "bedrock", &[TEXT]),
        ("amazon.titan-image-generator-v2", "bedrock", &[IMAGE]),
        ("amazon.titan-image-generator-v2:0", "bedrock", &[IMAGE]),
        ("amazon.titan-image-generator-v1", "bedrock", &[IMAGE]),
        ("amazon.nova-canvas-v1:0", "bedrock", &[IMAGE]),
        ("open-mistral-nemo", "mistral", &[TEXT]),
        ("mistral-small-latest", "mistral", &[TEXT]),
        ("dryrun-text-1", "dryrun", &[TEXT]),
        ("dryrun-image-1", "dryrun", &[IMAGE]),
    ];
    rows.iter()
        .map(|(name, provider, capabilities)| {
            (
                (*name).to_string(),
                ModelSpec::new(name, provider, capabilities),
            )
        })
        .collect()
}
