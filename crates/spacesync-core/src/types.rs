use serde::{Deserialize, Serialize};

/// Parent inode of root-level entries. No row carries this inode; it denotes
/// the root of the Archives tree itself.
pub const VIRTUAL_ROOT: u64 = 0;

/// Coarse content class of a catalog entry, derived from the file extension
/// at registration time. Directories are always [`EntryKind::Dir`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Dir,
    Video,
    Audio,
    Image,
    Pdf,
    Text,
    Blob,
}

impl EntryKind {
    /// Stable string form, used as the catalog column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dir => "dir",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Text => "text",
            Self::Blob => "blob",
        }
    }

    /// Parse the catalog column value back into a kind.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dir" => Some(Self::Dir),
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            "image" => Some(Self::Image),
            "pdf" => Some(Self::Pdf),
            "text" => Some(Self::Text),
            "blob" => Some(Self::Blob),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_dir(self) -> bool {
        matches!(self, Self::Dir)
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file or directory observed on Archives. The inode is taken from the
/// Archives filesystem and is the entry's identity; `(parent_ino, name)` is
/// unique within the catalog tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub inode: u64,
    /// Parent in the catalog tree; [`VIRTUAL_ROOT`] for root-level entries.
    pub parent_ino: u64,
    pub name: String,
    pub kind: EntryKind,
    /// Byte size; absent for directories.
    pub size: Option<i64>,
    /// Last observed Archives modification time, nanoseconds since the epoch.
    pub mtime: i64,
    /// User intent that this entry be mirrored on Spaces.
    pub selected: bool,
}

/// Mirror metadata for one entry, present exactly when the Spaces copy is
/// believed to exist. `synced_mtime` equals the actual Spaces mtime iff the
/// mirror is clean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpacesView {
    pub entry_ino: u64,
    /// Spaces mtime at the moment the mirror became clean, nanoseconds.
    pub synced_mtime: i64,
    /// Last verification timestamp, nanoseconds.
    pub checked_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_column_value() {
        for kind in [
            EntryKind::Dir,
            EntryKind::Video,
            EntryKind::Audio,
            EntryKind::Image,
            EntryKind::Pdf,
            EntryKind::Text,
            EntryKind::Blob,
        ] {
            assert_eq!(EntryKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntryKind::parse("symlink"), None);
    }

    #[test]
    fn entry_serializes_camel_case() {
        let entry = Entry {
            inode: 7,
            parent_ino: VIRTUAL_ROOT,
            name: "doc.txt".to_owned(),
            kind: EntryKind::Text,
            size: Some(5),
            mtime: 1_000,
            selected: false,
        };
        let json = serde_json::to_string(&entry).expect("entry should serialize");
        assert!(json.contains("\"parentIno\":0"));
        assert!(json.contains("\"kind\":\"text\""));
    }

    #[test]
    fn view_serializes_camel_case() {
        let view = SpacesView {
            entry_ino: 7,
            synced_mtime: 1_000,
            checked_at: 2_000,
        };
        let json = serde_json::to_string(&view).expect("view should serialize");
        assert!(json.contains("\"entryIno\":7"));
        assert!(json.contains("\"syncedMtime\":1000"));
    }
}
