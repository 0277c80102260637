//! Fixed content-type policy.

/// Declared types that carry no information and trigger content sniffing.
pub const PLACEHOLDER_CONTENT_TYPES: [&str; 2] = [
    "application/octet-stream",
    "application/x-www-form-urlencoded",
];

pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";
pub const FALLBACK_EXTENSION: &str = "bin";

/// Accepted MIME types paired with the extension used for synthesized filenames.
const ALLOWED_CONTENT_TYPES: &[(&str, &str)] = &[
    // Documents
    ("application/pdf", "pdf"),
    ("application/msword", "doc"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "docx",
    ),
    ("application/vnd.ms-excel", "xls"),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xlsx",
    ),
    ("application/vnd.ms-powerpoint", "ppt"),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "pptx",
    ),
    ("application/vnd.oasis.opendocument.text", "odt"),
    ("application/vnd.oasis.opendocument.spreadsheet", "ods"),
    ("application/rtf", "rtf"),
    ("application/epub+zip", "epub"),
    // Audio
    ("audio/mpeg", "mp3"),
    ("audio/ogg", "ogg"),
    ("audio/opus", "opus"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
    ("audio/webm", "weba"),
    ("audio/aac", "aac"),
    ("audio/mp4", "m4a"),
    ("audio/m4a", "m4a"),
    ("audio/x-flac", "flac"),
    ("audio/flac", "flac"),
    // Images
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/avif", "avif"),
    ("image/heic", "heic"),
    ("image/bmp", "bmp"),
    ("image/svg+xml", "svg"),
    // Video
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("video/ogg", "ogv"),
    ("video/quicktime", "mov"),
    ("video/x-matroska", "mkv"),
    // Text
    ("text/plain", "txt"),
    ("text/markdown", "md"),
    ("text/csv", "csv"),
];

/// Reduce a `content-type` header value to its lowercase media type, dropping parameters.
pub fn essence(header_value: &str) -> String {
    header_value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn is_placeholder(content_type: &str) -> bool {
    content_type.is_empty() || PLACEHOLDER_CONTENT_TYPES.contains(&content_type)
}

pub fn is_allowed(content_type: &str) -> bool {
    ALLOWED_CONTENT_TYPES
        .iter()
        .any(|(mime, _)| *mime == content_type)
}

/// Extension for an allowed type, `None` for anything outside the policy.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    ALLOWED_CONTENT_TYPES
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, ext)| *ext)
}
