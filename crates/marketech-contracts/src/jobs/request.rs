use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::media::{extension_for_mime, mime_for_path, sniff_mime, DEFAULT_IMAGE_MIME};

pub const MIN_VARIATIONS: u32 = 1;
pub const MAX_VARIATIONS: u32 = 4;

/// Image bytes uploaded alongside the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ReferenceImage {
    /// Wraps raw bytes; the MIME type is sniffed, then taken from `declared`,
    /// then defaults to PNG.
    pub fn from_bytes(bytes: Vec<u8>, declared: Option<&str>) -> Self {
        let mime_type = sniff_mime(&bytes)
            .or(declared.map(str::trim).filter(|value| !value.is_empty()))
            .unwrap_or(DEFAULT_IMAGE_MIME)
            .to_string();
        Self { bytes, mime_type }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        if bytes.is_empty() {
            bail!("reference image {} is empty", path.display());
        }
        Ok(Self::from_bytes(bytes, mime_for_path(path)))
    }

    /// Decodes a `data:<mime>;base64,<payload>` URL as produced by browser
    /// file readers.
    pub fn from_data_url(value: &str) -> Result<Self> {
        let (meta, payload) = value
            .trim()
            .split_once(',')
            .ok_or_else(|| anyhow::anyhow!("invalid data URL image payload"))?;
        let declared = meta
            .trim()
            .strip_prefix("data:")
            .and_then(|rest| rest.split(';').next())
            .map(str::trim)
            .filter(|item| !item.is_empty());
        if !meta.contains(";base64") {
            bail!("only base64 data URLs are supported");
        }
        let bytes = BASE64
            .decode(payload.trim().as_bytes())
            .context("reference image data URL base64 decode failed")?;
        if bytes.is_empty() {
            bail!("reference image data URL is empty");
        }
        Ok(Self::from_bytes(bytes, declared))
    }

    /// Name given to the multipart attachment.
    pub fn file_name(&self) -> String {
        let ext = match extension_for_mime(Some(&self.mime_type)) {
            "bin" => "png",
            ext => ext,
        };
        format!("input_image.{ext}")
    }
}

/// Caller input for one generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub prompt: String,
    pub reference_image: Option<ReferenceImage>,
    pub style_modifier: String,
    pub variation_count: u32,
}

impl JobRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            reference_image: None,
            style_modifier: String::new(),
            variation_count: MIN_VARIATIONS,
        }
    }

    pub fn with_reference_image(mut self, image: ReferenceImage) -> Self {
        self.reference_image = Some(image);
        self
    }

    pub fn with_style_modifier(mut self, modifier: impl Into<String>) -> Self {
        self.style_modifier = modifier.into();
        self
    }

    pub fn with_variation_count(mut self, count: u32) -> Self {
        self.variation_count = count;
        self
    }

    /// Checks the fields the submitter relies on. Does not require the
    /// reference image; the orchestrator enforces that separately.
    pub fn validate(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("prompt must not be empty".to_string());
        }
        if !(MIN_VARIATIONS..=MAX_VARIATIONS).contains(&self.variation_count) {
            return Err(format!(
                "variation count must be between {MIN_VARIATIONS} and {MAX_VARIATIONS} (got {})",
                self.variation_count
            ));
        }
        Ok(())
    }

    /// Free-text guidance sent as `brand_guidelines`.
    pub fn brand_guidelines(&self) -> String {
        format!(
            "Camera Angle: {}. Style: Premium and Creative.",
            self.style_modifier.trim()
        )
    }
}

/// Opaque identifier of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.job_id
    }
}
