use anyhow::{bail, Result};
use marketech_contracts::config::ClientConfig;
use marketech_contracts::results::{BlobHandle, Resolution};
use serde_json::Value;

use crate::blobs::BlobStore;
use crate::error::error_chain_text;
use crate::transport::Transport;

/// Turns a result reference into something renderable.
///
/// - external absolute URLs are returned untouched, with no request
/// - backend or tunnel URLs are fetched and stored as local blobs
/// - relative paths are joined onto the base URL and fetched the same way
///
/// A failed fetch degrades to the URL that was attempted. Resolution never
/// fails outright; an unusable reference yields no handle.
pub struct ResourceResolver<'a> {
    config: &'a ClientConfig,
    transport: &'a dyn Transport,
    blobs: &'a BlobStore,
}

impl<'a> ResourceResolver<'a> {
    pub fn new(
        config: &'a ClientConfig,
        transport: &'a dyn Transport,
        blobs: &'a BlobStore,
    ) -> Self {
        Self {
            config,
            transport,
            blobs,
        }
    }

    /// Accepts a string, or an object carrying a string `url` (one level).
    pub fn resolve(&self, reference: &Value) -> Resolution {
        match reference {
            Value::String(raw) => self.resolve_str(raw),
            Value::Object(fields) => match fields.get("url") {
                Some(Value::String(raw)) => self.resolve_str(raw),
                _ => Resolution::unusable(),
            },
            _ => Resolution::unusable(),
        }
    }

    pub fn resolve_str(&self, raw: &str) -> Resolution {
        let reference = raw.trim();
        if reference.is_empty() {
            return Resolution::unusable();
        }
        if is_data_url(reference) {
            return Resolution::passthrough(reference);
        }
        if is_absolute_http(reference) {
            if !self.config.is_backend_url(reference) {
                return Resolution::passthrough(reference);
            }
            return self.fetch_or_degrade(reference);
        }
        let url = self.config.absolute_url(reference);
        self.fetch_or_degrade(&url)
    }

    fn fetch_or_degrade(&self, url: &str) -> Resolution {
        match self.fetch(url) {
            Ok(blob) => Resolution::materialized(blob),
            Err(err) => Resolution::degraded(url, error_chain_text(&err, 256)),
        }
    }

    fn fetch(&self, url: &str) -> Result<BlobHandle> {
        let response = self.transport.get(url)?;
        if !response.is_success() {
            bail!("image request returned {}", response.status);
        }
        if response.is_html() {
            bail!("backend answered with an HTML page instead of image bytes");
        }
        self.blobs
            .materialize(&response.body, response.content_type.as_deref())
    }
}

fn is_absolute_http(reference: &str) -> bool {
    let lowered = reference.to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}

fn is_data_url(reference: &str) -> bool {
    reference.to_ascii_lowercase().starts_with("data:image/")
}
