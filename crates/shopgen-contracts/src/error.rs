use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures the asset pipeline reports to its caller.
///
/// None of these are recovered locally; they travel inside `anyhow::Error`
/// and can be recovered with `downcast_ref::<AssetError>()`.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("catalog format error: {0}")]
    CatalogFormat(String),

    #[error("generation failed for model '{model}'")]
    Generation {
        model: String,
        #[source]
        source: BoxError,
    },

    #[error("model '{model}' returned no {what}")]
    EmptyResult { model: String, what: &'static str },

    #[error("missing asset: {0}")]
    MissingAsset(String),
}

impl AssetError {
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::CatalogFormat(message.into())
    }

    pub fn generation(model: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Generation {
            model: model.into(),
            source: source.into(),
        }
    }

    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Generation { model, .. } | Self::EmptyResult { model, .. } => Some(model),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::AssetError;

    #[test]
    fn generation_error_keeps_model_and_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = AssetError::generation("amazon.titan-image-generator-v2", cause);
        assert_eq!(err.model(), Some("amazon.titan-image-generator-v2"));
        assert_eq!(
            err.to_string(),
            "generation failed for model 'amazon.titan-image-generator-v2'"
        );
        let source = err.source().map(ToString::to_string).unwrap_or_default();
        assert_eq!(source, "refused");
    }

    #[test]
    fn anyhow_wrapped_errors_downcast_back() {
        let err: anyhow::Error = AssetError::catalog("no PRODUCTS").into();
        assert!(matches!(
            err.downcast_ref::<AssetError>(),
            Some(AssetError::CatalogFormat(message)) if message == "no PRODUCTS"
        ));
    }
}
