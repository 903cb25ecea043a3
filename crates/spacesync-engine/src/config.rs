use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine construction parameters. Timings are tunable so tests can shrink
/// the debounce and retry windows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Canonical long-term tree.
    pub archives_root: PathBuf,
    /// Working mirror tree.
    pub spaces_root: PathBuf,
    /// Directory holding the catalog database and the optional ignore file.
    pub config_dir: PathBuf,
    /// Watcher quiet window before pending paths flush to the queue.
    pub debounce_ms: u64,
    /// Wait between a failed pipeline pass and its single retry.
    pub retry_backoff_ms: u64,
    /// Catalog lock-wait bound.
    pub busy_timeout_ms: u64,
}

impl EngineConfig {
    pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
    pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 5_000;
    pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

    #[must_use]
    pub fn new(
        archives_root: impl Into<PathBuf>,
        spaces_root: impl Into<PathBuf>,
        config_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            archives_root: archives_root.into(),
            spaces_root: spaces_root.into(),
            config_dir: config_dir.into(),
            debounce_ms: Self::DEFAULT_DEBOUNCE_MS,
            retry_backoff_ms: Self::DEFAULT_RETRY_BACKOFF_MS,
            busy_timeout_ms: Self::DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    /// Soft-deleted mirrors land here, under dated subdirectories.
    #[must_use]
    pub fn trash_root(&self) -> PathBuf {
        self.spaces_root.join(".trash")
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.config_dir.join("sync.db")
    }

    #[must_use]
    pub fn ignore_path(&self) -> PathBuf {
        self.config_dir.join(".syncignore")
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    #[must_use]
    pub fn archives_path(&self, rel: &str) -> PathBuf {
        self.archives_root.join(rel)
    }

    #[must_use]
    pub fn spaces_path(&self, rel: &str) -> PathBuf {
        self.spaces_root.join(rel)
    }

    #[must_use]
    pub fn catalog_config(&self) -> spacesync_catalog::CatalogConfig {
        spacesync_catalog::CatalogConfig {
            db_path: self.db_path(),
            wal_mode: true,
            busy_timeout_ms: self.busy_timeout_ms,
        }
    }
}

/// Convert an absolute path under `root` into the engine's relative form.
/// Returns `None` for the root itself and for paths outside it.
#[must_use]
pub fn rel_from_root(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    Some(rel.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths() {
        let config = EngineConfig::new("/a", "/s", "/cfg");
        assert_eq!(config.trash_root(), PathBuf::from("/s/.trash"));
        assert_eq!(config.db_path(), PathBuf::from("/cfg/sync.db"));
        assert_eq!(config.ignore_path(), PathBuf::from("/cfg/.syncignore"));
        assert_eq!(config.archives_path("x/y.txt"), PathBuf::from("/a/x/y.txt"));
        assert_eq!(config.spaces_path("x/y.txt"), PathBuf::from("/s/x/y.txt"));
    }

    #[test]
    fn rel_from_root_strips_prefix() {
        let root = Path::new("/data/archives");
        assert_eq!(
            rel_from_root(root, Path::new("/data/archives/a/b.txt")),
            Some("a/b.txt".to_owned())
        );
        assert_eq!(rel_from_root(root, Path::new("/data/archives")), None);
        assert_eq!(rel_from_root(root, Path::new("/elsewhere/x")), None);
    }
}
