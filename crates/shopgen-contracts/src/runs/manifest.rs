use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const MANIFEST_FILE_NAME: &str = "product_descriptions.json";
pub const IMAGES_DIR_NAME: &str = "images";

/// One manifest row: the description that shipped and, if one was produced,
/// the image written for the product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedAsset {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
}

pub fn image_file_name(product_id: &str) -> String {
    format!("{product_id}.png")
}

/// Writes the manifest as a pretty JSON array, in the order given.
///
/// The file is staged next to its destination and renamed into place, so an
/// interrupted write never leaves a truncated manifest behind.
pub fn write_manifest(out_dir: &Path, assets: &[GeneratedAsset]) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let path = out_dir.join(MANIFEST_FILE_NAME);
    let staging = out_dir.join(format!(".{MANIFEST_FILE_NAME}.partial"));
    let body = serde_json::to_string_pretty(assets)?;
    std::fs::write(&staging, body)
        .with_context(|| format!("failed to write {}", staging.display()))?;
    std::fs::rename(&staging, &path)
        .with_context(|| format!("failed to move manifest into {}", path.display()))?;
    Ok(path)
}

pub fn read_manifest(path: &Path) -> anyhow::Result<Vec<GeneratedAsset>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    Ok(serde_json::from_str(&raw)?)
}
