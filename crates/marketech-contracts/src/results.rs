use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::Value;

/// Field names probed, in order, when a result item is an object.
pub const REFERENCE_FIELDS: &[&str] = &["url", "uri", "path", "image_url", "result_url"];

/// One entry of a terminal job's `results` list.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResultItem {
    /// A reference the resolver can work with: a string, or a nested object
    /// that itself carries a `url`.
    Reference(Value),
    Unresolvable(Value),
}

impl RawResultItem {
    pub fn from_value(item: &Value) -> Self {
        match item {
            Value::String(text) if !text.trim().is_empty() => Self::Reference(item.clone()),
            Value::Object(fields) => REFERENCE_FIELDS
                .iter()
                .find_map(|name| match fields.get(*name) {
                    Some(Value::String(text)) if !text.trim().is_empty() => {
                        Some(Value::String(text.clone()))
                    }
                    Some(nested @ Value::Object(_)) => Some(nested.clone()),
                    _ => None,
                })
                .map(Self::Reference)
                .unwrap_or_else(|| Self::Unresolvable(item.clone())),
            _ => Self::Unresolvable(item.clone()),
        }
    }

    pub fn reference(&self) -> Option<&Value> {
        match self {
            Self::Reference(value) => Some(value),
            Self::Unresolvable(_) => None,
        }
    }
}

/// Image bytes written to local storage by the resolver.
///
/// The caller owns the file; call [`BlobHandle::release`] once the image is
/// no longer displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle {
    pub id: String,
    pub path: PathBuf,
    pub mime_type: Option<String>,
    pub sha256: String,
    pub len: usize,
}

impl BlobHandle {
    pub fn release(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed releasing blob {}", self.path.display()))
            }
        }
    }
}

/// Something a renderer can display without further network access, or a
/// direct URL when the bytes were not fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceHandle {
    Blob(BlobHandle),
    Url(String),
}

impl ResourceHandle {
    pub fn locator(&self) -> String {
        match self {
            Self::Blob(blob) => blob.path.to_string_lossy().to_string(),
            Self::Url(url) => url.clone(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Blob(_))
    }

    /// Frees local storage behind the handle. URLs need no release.
    pub fn release(&self) -> Result<()> {
        match self {
            Self::Blob(blob) => blob.release(),
            Self::Url(_) => Ok(()),
        }
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.locator())
    }
}

/// How the resolver arrived at a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// Backend bytes were fetched and stored locally.
    Materialized,
    /// External URL returned untouched; nothing was fetched.
    Passthrough,
    /// A backend fetch failed; the handle is the URL that was attempted.
    Degraded { reason: String },
    /// The reference could not be used at all.
    Unusable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub handle: Option<ResourceHandle>,
    pub outcome: ResolutionOutcome,
}

impl Resolution {
    pub fn unusable() -> Self {
        Self {
            handle: None,
            outcome: ResolutionOutcome::Unusable,
        }
    }

    pub fn passthrough(url: impl Into<String>) -> Self {
        Self {
            handle: Some(ResourceHandle::Url(url.into())),
            outcome: ResolutionOutcome::Passthrough,
        }
    }

    pub fn degraded(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            handle: Some(ResourceHandle::Url(url.into())),
            outcome: ResolutionOutcome::Degraded {
                reason: reason.into(),
            },
        }
    }

    pub fn materialized(blob: BlobHandle) -> Self {
        Self {
            handle: Some(ResourceHandle::Blob(blob)),
            outcome: ResolutionOutcome::Materialized,
        }
    }

    pub fn locator(&self) -> String {
        self.handle
            .as_ref()
            .map(ResourceHandle::locator)
            .unwrap_or_default()
    }
}

/// One generated image handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub id: String,
    pub handle: ResourceHandle,
    pub prompt_used: String,
    /// Reference string the server reported for this image.
    pub source: String,
    pub outcome: ResolutionOutcome,
}

impl ResolvedImage {
    pub fn new(
        handle: ResourceHandle,
        prompt_used: &str,
        source: String,
        outcome: ResolutionOutcome,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            handle,
            prompt_used: prompt_used.to_string(),
            source,
            outcome,
        }
    }
}
