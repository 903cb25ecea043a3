//! The external read surface: catalog listings with derived status labels,
//! point lookups, and aggregate counters.

use std::path::{Path, PathBuf};

use serde::Serialize;
use spacesync_catalog::{Catalog, ChildCounts, DirSize, StatusCounts};
use spacesync_core::{Entry, PathState, SyncResult, UiStatus, VIRTUAL_ROOT};

use crate::fileops::stat_path;
use crate::selection::Selection;

/// One listed entry, enriched with the derived status and, for directories,
/// child counters and optional subtree sizes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryStatus {
    #[serde(flatten)]
    pub entry: Entry,
    pub status: UiStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_counts: Option<ChildCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizes: Option<DirSize>,
}

/// Aggregate counters for the whole store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// Capacity of the filesystem holding Archives, bytes.
    pub disk_total: u64,
    /// Free space on that filesystem, bytes.
    pub disk_free: u64,
    /// Total size of all catalogued files.
    pub archives_size: i64,
    /// Total size of files whose mirror view exists.
    pub synced_size: i64,
}

/// Read-only view over one catalog connection plus the two roots.
pub struct CatalogView<'a> {
    catalog: &'a Catalog,
    archives_root: &'a Path,
    spaces_root: &'a Path,
}

impl<'a> CatalogView<'a> {
    #[must_use]
    pub fn new(catalog: &'a Catalog, archives_root: &'a Path, spaces_root: &'a Path) -> Self {
        Self {
            catalog,
            archives_root,
            spaces_root,
        }
    }

    /// List the children of a parent inode (`None` = virtual root) with
    /// derived status labels; `with_sizes` adds per-subtree byte totals for
    /// directories.
    pub fn list_children(
        &self,
        parent_ino: Option<u64>,
        with_sizes: bool,
    ) -> SyncResult<Vec<EntryStatus>> {
        let parent_ino = parent_ino.unwrap_or(VIRTUAL_ROOT);
        let parent_rel = self.rel_path_of_ino(parent_ino)?;
        let children = self.catalog.list_children(parent_ino)?;

        let mut items = Vec::with_capacity(children.len());
        for child in children {
            let rel = match &parent_rel {
                Some(parent) => format!("{parent}/{}", child.name),
                None => child.name.clone(),
            };
            let status = self.status_of(&child, &rel)?;
            let (child_counts, sizes) = if child.kind.is_dir() {
                let counts = self.catalog.child_counts(child.inode)?;
                let sizes = if with_sizes {
                    Some(self.catalog.dir_size(child.inode)?)
                } else {
                    None
                };
                (Some(counts), sizes)
            } else {
                (None, None)
            };
            items.push(EntryStatus {
                entry: child,
                status,
                child_counts,
                sizes,
            });
        }
        Ok(items)
    }

    /// Resolve a `/`-separated path to the inode of its last component.
    /// The empty path and `/` resolve to the virtual root.
    pub fn resolve_path(&self, path: &str) -> SyncResult<Option<u64>> {
        let mut parent_ino = VIRTUAL_ROOT;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            match self.catalog.get_entry_by_path(parent_ino, part)? {
                Some(e) => parent_ino = e.inode,
                None => return Ok(None),
            }
        }
        Ok(Some(parent_ino))
    }

    pub fn entry(&self, inode: u64) -> SyncResult<Option<Entry>> {
        self.catalog.get_entry(inode)
    }

    /// Derived status of one entry at a known relative path.
    pub fn status_of(&self, entry: &Entry, rel: &str) -> SyncResult<UiStatus> {
        let view = self.catalog.get_spaces_view(entry.inode)?;
        let archives_mtime = stat_path(&self.archives_root.join(rel)).map(|s| s.mtime_ns);
        let spaces_mtime = stat_path(&self.spaces_root.join(rel)).map(|s| s.mtime_ns);
        let state = PathState::compute(Some(entry), view.as_ref(), archives_mtime, spaces_mtime);
        Ok(state.ui_status())
    }

    /// Aggregate counters, including free/total space of the filesystem
    /// holding the Archives root.
    pub fn stats(&self) -> SyncResult<SyncStats> {
        let (disk_total, disk_free) = disk_space(self.archives_root);
        Ok(SyncStats {
            disk_total,
            disk_free,
            archives_size: self.catalog.aggregate_total_size()?,
            synced_size: self.catalog.aggregate_synced_size()?,
        })
    }

    /// Whole-catalog label counts.
    pub fn status_counts(&self) -> SyncResult<StatusCounts> {
        self.catalog.status_counts()
    }

    /// Selection surface sharing this view's catalog connection.
    #[must_use]
    pub fn selection<'q>(&self, queue: &'q crate::queue::EvalQueue) -> Selection<'q>
    where
        'a: 'q,
    {
        Selection::new(self.catalog, queue)
    }

    fn rel_path_of_ino(&self, inode: u64) -> SyncResult<Option<String>> {
        if inode == VIRTUAL_ROOT {
            return Ok(None);
        }
        let mut parts = Vec::new();
        let mut current = inode;
        while current != VIRTUAL_ROOT {
            match self.catalog.get_entry(current)? {
                Some(entry) => {
                    parts.push(entry.name);
                    current = entry.parent_ino;
                }
                None => return Ok(None),
            }
        }
        parts.reverse();
        Ok(Some(parts.join("/")))
    }
}

/// Total and available bytes of the filesystem holding `path`, from the
/// mount whose mount point is the longest prefix of it. `(0, 0)` when no
/// mount matches (the counters are best-effort).
fn disk_space(path: &Path) -> (u64, u64) {
    let resolved: PathBuf = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let mut best: Option<(usize, u64, u64)> = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if resolved.starts_with(mount) {
            let depth = mount.components().count();
            if best.map_or(true, |(d, _, _)| depth > d) {
                best = Some((depth, disk.total_space(), disk.available_space()));
            }
        }
    }
    best.map_or((0, 0), |(_, total, free)| (total, free))
}
