//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Uploaded file paths can contain user names or customer identifiers, so
//! spans only ever carry the file name or a short task id prefix.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// First `n` characters of an id, safe for any UTF-8 input.
pub fn short_id(id: &str, n: usize) -> &str {
    match id.char_indices().nth(n) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// File stem usable as an output name; falls back to `document`.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document")
        .to_string()
}
