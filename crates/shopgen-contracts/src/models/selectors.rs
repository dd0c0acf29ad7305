use super::registry::{infer_provider, ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    /// Resolves `requested` for `capability`.
    ///
    /// Registered models must support the capability. Unregistered ids are
    /// passed through with an inferred provider, since hosted catalogs grow
    /// faster than the registry.
    pub fn select(&self, requested: &str, capability: &str) -> Result<ModelSelection, String> {
        let requested = requested.trim();
        if requested.is_empty() {
            return Err(format!("No model specified for capability '{capability}'."));
        }
        if let Some(model) = self.registry.get(requested) {
            if model.supports(capability) {
                return Ok(ModelSelection {
                    model: model.clone(),
                    note: None,
                });
            }
            return Err(format!(
                "Model '{requested}' does not support capability '{capability}'."
            ));
        }
        let provider = infer_provider(requested);
        Ok(ModelSelection {
            model: ModelSpec::new(requested, provider, &[capability]),
            note: Some(format!(
                "Model '{requested}' is not registered; assuming provider '{provider}'."
            )),
        })
    }
}
