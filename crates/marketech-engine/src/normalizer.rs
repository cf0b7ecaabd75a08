use std::thread;

use marketech_contracts::results::{RawResultItem, Resolution, ResolvedImage};
use serde_json::Value;

use crate::resolver::ResourceResolver;

/// A result entry that produced no image.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedResult {
    pub index: usize,
    pub item: Value,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct NormalizedResults {
    pub images: Vec<ResolvedImage>,
    pub skipped: Vec<SkippedResult>,
}

/// Upper bound on resolution threads alive at once.
pub const MAX_CONCURRENT_RESOLUTIONS: usize = 8;

/// Resolves result items concurrently, at most
/// [`MAX_CONCURRENT_RESOLUTIONS`] at a time, and returns images in input
/// order. Items without a usable reference are skipped, never fatal.
pub fn normalize(
    resolver: &ResourceResolver<'_>,
    items: &[Value],
    prompt_used: &str,
) -> NormalizedResults {
    let mut resolutions: Vec<Result<Option<Resolution>, String>> = Vec::with_capacity(items.len());
    for batch in items.chunks(MAX_CONCURRENT_RESOLUTIONS) {
        thread::scope(|scope| {
            let workers = batch
                .iter()
                .map(|item| {
                    let raw = RawResultItem::from_value(item);
                    scope.spawn(move || raw.reference().map(|reference| resolver.resolve(reference)))
                })
                .collect::<Vec<_>>();
            resolutions.extend(workers.into_iter().map(|worker| {
                worker
                    .join()
                    .map_err(|_| "resolution worker panicked".to_string())
            }));
        });
    }

    let mut normalized = NormalizedResults::default();
    for (index, (item, resolution)) in items.iter().zip(resolutions).enumerate() {
        let skip = |reason: &str| SkippedResult {
            index,
            item: item.clone(),
            reason: reason.to_string(),
        };
        match resolution {
            Err(reason) => normalized.skipped.push(skip(&reason)),
            Ok(None) => normalized
                .skipped
                .push(skip("no url, uri, path, image_url or result_url field")),
            Ok(Some(Resolution {
                handle: None, ..
            })) => normalized
                .skipped
                .push(skip("reference did not resolve to a usable resource")),
            Ok(Some(Resolution {
                handle: Some(handle),
                outcome,
            })) => {
                let source = RawResultItem::from_value(item)
                    .reference()
                    .map(reference_text)
                    .unwrap_or_default();
                normalized
                    .images
                    .push(ResolvedImage::new(handle, prompt_used, source, outcome));
            }
        }
    }
    normalized
}

fn reference_text(reference: &Value) -> String {
    match reference {
        Value::String(text) => text.trim().to_string(),
        Value::Object(fields) => fields
            .get("url")
            .and_then(Value::as_str)
            .map(|text| text.trim().to_string())
            .unwrap_or_else(|| reference.to_string()),
        other => other.to_string(),
    }
}
