mod registry;
mod selectors;

pub use registry::{infer_provider, ModelRegistry, ModelSpec, IMAGE, TEXT};
pub use selectors::{ModelSelection, ModelSelector};
