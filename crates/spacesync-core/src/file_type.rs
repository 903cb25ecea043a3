//! Extension-based content classification for catalog entries.

use crate::types::EntryKind;

/// Classify a path component into an [`EntryKind`] from its extension.
///
/// Directories never reach this function; callers map them to
/// [`EntryKind::Dir`] directly. Unknown and missing extensions fall back to
/// [`EntryKind::Blob`].
#[must_use]
pub fn classify_name(name: &str) -> EntryKind {
    let ext = match name.rsplit_once('.') {
        // A leading dot alone is a hidden name, not an extension.
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => return EntryKind::Blob,
    };

    match ext.as_str() {
        "mp4" | "mkv" | "avi" | "mov" | "wmv" | "flv" | "webm" | "m4v" => EntryKind::Video,
        "mp3" | "wav" | "flac" | "aac" | "ogg" | "wma" | "m4a" | "opus" => EntryKind::Audio,
        "jpg" | "jpeg" | "png" | "gif" | "bmp" | "svg" | "webp" | "tiff" | "ico" => {
            EntryKind::Image
        }
        "pdf" => EntryKind::Pdf,
        "txt" | "md" | "json" | "xml" | "csv" | "yaml" | "yml" | "toml" | "go" | "py" | "js"
        | "ts" | "html" | "css" | "sh" | "bash" | "c" | "h" | "cpp" | "java" | "rs" | "rb"
        | "php" | "vue" | "sql" => EntryKind::Text,
        _ => EntryKind::Blob,
    }
}
