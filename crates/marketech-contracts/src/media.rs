use std::path::Path;

pub const DEFAULT_IMAGE_MIME: &str = "image/png";

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Detects the image type from magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
}

/// File extension for a MIME type, tolerating parameters such as
/// `image/png; charset=binary`. Unknown types map to `bin`.
pub fn extension_for_mime(mime: Option<&str>) -> &'static str {
    let Some(raw) = mime else {
        return "bin";
    };
    let lowered = raw.trim().to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    if lowered.contains("png") {
        return "png";
    }
    if lowered.contains("gif") {
        return "gif";
    }
    "bin"
}
