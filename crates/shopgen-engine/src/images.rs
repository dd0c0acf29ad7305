use std::fs;
use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use shopgen_contracts::error::AssetError;
use shopgen_contracts::providers::NamedProvider;

use crate::bedrock::BedrockRuntime;

const DRYRUN_MAX_EDGE: u32 = 2048;

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub quality: String,
    pub cfg_scale: f64,
}

/// Produces exactly one PNG at `target` for the request's prompt.
pub trait ImageProvider: NamedProvider + Send + Sync {
    fn generate(&self, request: &ImageRequest, target: &Path) -> Result<()>;
}

/// Text-to-image through Bedrock (Titan / Nova Canvas request shape).
pub struct BedrockImageProvider {
    runtime: BedrockRuntime,
}

impl BedrockImageProvider {
    pub fn new(runtime: BedrockRuntime) -> Self {
        Self { runtime }
    }

    pub fn request_body(request: &ImageRequest) -> Value {
        json!({
            "taskType": "TEXT_IMAGE",
            "textToImageParams": {"text": request.prompt},
            "imageGenerationConfig": {
                "numberOfImages": 1,
                "quality": request.quality,
                "width": request.width,
                "height": request.height,
                "cfgScale": request.cfg_scale,
            },
        })
    }

    /// Returns the first generated image as PNG bytes.
    pub fn invoke(&self, request: &ImageRequest) -> Result<Vec<u8>> {
        let model = request.model.as_str();
        let payload = self
            .runtime
            .invoke(model, &Self::request_body(request))
            .map_err(|err| AssetError::generation(model, err))?;
        if let Some(reason) = payload
            .get("error")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return Err(AssetError::generation(model, format!("provider reported: {reason}")).into());
        }
        let encoded = payload
            .get("images")
            .and_then(Value::as_array)
            .and_then(|images| images.first())
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| empty_image(model))?;
        let bytes = BASE64
            .decode(encoded.as_bytes())
            .map_err(|err| AssetError::generation(model, err))?;
        if bytes.is_empty() {
            return Err(empty_image(model).into());
        }
        ensure_png(bytes).map_err(|err| AssetError::generation(model, err).into())
    }
}

impl NamedProvider for BedrockImageProvider {
    fn name(&self) -> &str {
        "bedrock"
    }
}

impl ImageProvider for BedrockImageProvider {
    fn generate(&self, request: &ImageRequest, target: &Path) -> Result<()> {
        let bytes = self.invoke(request)?;
        write_image(target, &bytes)
    }
}

/// Offline stand-in: a solid PNG whose colour is a hash of the prompt.
pub struct DryrunImageProvider;

impl NamedProvider for DryrunImageProvider {
    fn name(&self) -> &str {
        "dryrun"
    }
}

impl ImageProvider for DryrunImageProvider {
    fn generate(&self, request: &ImageRequest, target: &Path) -> Result<()> {
        let width = request.width.clamp(1, DRYRUN_MAX_EDGE);
        let height = request.height.clamp(1, DRYRUN_MAX_EDGE);
        let (r, g, b) = color_from_prompt(&request.prompt);
        let mut image = RgbImage::new(width, height);
        for pixel in image.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        image
            .save_with_format(target, ImageFormat::Png)
            .with_context(|| format!("failed to save {}", target.display()))
    }
}

/// Passes PNG through untouched and re-encodes anything else `image` can read.
pub fn ensure_png(bytes: Vec<u8>) -> Result<Vec<u8>> {
    if image::guess_format(&bytes).ok() == Some(ImageFormat::Png) {
        return Ok(bytes);
    }
    let decoded =
        image::load_from_memory(&bytes).context("image payload is not a decodable image")?;
    let mut out = Cursor::new(Vec::new());
    decoded
        .write_to(&mut out, ImageFormat::Png)
        .context("failed to re-encode image as PNG")?;
    Ok(out.into_inner())
}

pub fn write_image(target: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(target, bytes).with_context(|| format!("failed to write {}", target.display()))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(prompt.as_bytes());
    (digest[0], digest[1], digest[2])
}

fn empty_image(model: &str) -> AssetError {
    AssetError::EmptyResult {
        model: model.to_string(),
        what: "image",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_support::{closed_port_url, is_png, test_client, tiny_png, MockServer};

    fn request(model: &str) -> ImageRequest {
        ImageRequest {
            model: model.to_string(),
            prompt: "Studio product photo of a tops item".to_string(),
            width: 1024,
            height: 768,
            quality: "premium".to_string(),
            cfg_scale: 8.0,
        }
    }

    fn provider_at(base_url: String) -> anyhow::Result<BedrockImageProvider> {
        Ok(BedrockImageProvider::new(BedrockRuntime::new(
            base_url,
            Some("key".to_string()),
            test_client()?,
        )))
    }

    #[test]
    fn titan_envelope_requests_one_image() {
        let body = BedrockImageProvider::request_body(&request("amazon.titan-image-generator-v2"));
        assert_eq!(
            body,
            json!({
                "taskType": "TEXT_IMAGE",
                "textToImageParams": {"text": "Studio product photo of a tops item"},
                "imageGenerationConfig": {
                    "numberOfImages": 1,
                    "quality": "premium",
                    "width": 1024,
                    "height": 768,
                    "cfgScale": 8.0,
                },
            })
        );
    }

    #[test]
    fn decodes_first_image_and_writes_png() -> anyhow::Result<()> {
        let png = tiny_png()?;
        let server = MockServer::start(vec![(
            200,
            json!({"images": [BASE64.encode(&png)], "error": null}).to_string(),
        )])?;
        let provider = provider_at(server.base_url())?;
        let temp = tempfile::tempdir()?;
        let target = temp.path().join("images").join("tee-001.png");

        provider.generate(&request("amazon.titan-image-generator-v2"), &target)?;
        assert_eq!(fs::read(&target)?, png);
        server.finish()?;
        Ok(())
    }

    #[test]
    fn missing_images_is_empty_result() -> anyhow::Result<()> {
        let server = MockServer::start(vec![
            (200, json!({"images": []}).to_string()),
            (200, json!({"images": [""]}).to_string()),
        ])?;
        let provider = provider_at(server.base_url())?;
        for _ in 0..2 {
            let err = provider.invoke(&request("amazon.nova-canvas-v1:0")).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<AssetError>(),
                Some(AssetError::EmptyResult { what: "image", model }) if model == "amazon.nova-canvas-v1:0"
            ));
        }
        server.finish()?;
        Ok(())
    }

    #[test]
    fn provider_error_field_and_transport_failures_are_generation_errors() -> anyhow::Result<()> {
        let server = MockServer::start(vec![(
            200,
            json!({"images": [], "error": "This request has been blocked by our content filters."})
                .to_string(),
        )])?;
        let provider = provider_at(server.base_url())?;
        let err = provider.invoke(&request("amazon.titan-image-generator-v2")).unwrap_err();
        assert!(format!("{err:#}").contains("content filters"));
        server.finish()?;

        let offline = provider_at(closed_port_url()?)?;
        let err = offline.invoke(&request("amazon.titan-image-generator-v1")).unwrap_err();
        assert_eq!(
            err.downcast_ref::<AssetError>().and_then(AssetError::model),
            Some("amazon.titan-image-generator-v1")
        );
        Ok(())
    }

    #[test]
    fn non_png_payloads_are_reencoded() -> anyhow::Result<()> {
        let image = RgbImage::from_pixel(4, 4, Rgb([200, 10, 10]));
        let mut jpeg = Cursor::new(Vec::new());
        image.write_to(&mut jpeg, ImageFormat::Jpeg)?;
        let converted = ensure_png(jpeg.into_inner())?;
        assert_eq!(image::guess_format(&converted)?, ImageFormat::Png);

        assert!(ensure_png(b"not an image".to_vec()).is_err());
        Ok(())
    }

    #[test]
    fn dryrun_writes_prompt_colored_png() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let target = temp.path().join("nested").join("cap-005.png");
        let mut req = request("dryrun-image-1");
        req.width = 8;
        req.height = 4;
        DryrunImageProvider.generate(&req, &target)?;

        assert!(is_png(&target));
        let written = image::open(&target)?.to_rgb8();
        assert_eq!(written.dimensions(), (8, 4));
        let (r, g, b) = color_from_prompt(&req.prompt);
        assert_eq!(written.get_pixel(3, 2), &Rgb([r, g, b]));
        Ok(())
    }

    #[test]
    fn sha256_is_hex_encoded() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
