//! Full enqueue of the known world, run at startup and after watcher
//! overflow.
//!
//! Three sources feed the queue: a walk of Archives, a walk of Spaces, and
//! a depth-first walk of the catalog. The catalog walk is the only way to
//! reach rows whose path is gone from both disks — those entries must still
//! be evaluated so the pipeline can retire them. The queue deduplicates, so
//! overlapping sources are free, and walk order guarantees parents are
//! enqueued before their children.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use spacesync_catalog::Catalog;
use spacesync_core::{SyncResult, VIRTUAL_ROOT};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::ignore::IgnoreRules;
use crate::path_cache::PathCache;
use crate::queue::EvalQueue;

/// Enqueue every path known to either disk or the catalog.
///
/// The `scanning` flag collapses concurrent requests: if a walk is already
/// running the call returns immediately.
pub fn enqueue_all(
    catalog: &Catalog,
    archives_root: &Path,
    spaces_root: &Path,
    ignore: &IgnoreRules,
    queue: &EvalQueue,
    cache: &PathCache,
    scanning: &AtomicBool,
) {
    if scanning
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }

    info!(target: "spacesync.reconcile", "full enqueue starting");

    let archives_count = walk_and_enqueue(archives_root, queue, ignore);
    info!(target: "spacesync.reconcile", count = archives_count, "archives walked");

    let spaces_count = walk_and_enqueue(spaces_root, queue, ignore);
    info!(target: "spacesync.reconcile", count = spaces_count, "spaces walked");

    if let Err(error) = enqueue_catalog_subtree(catalog, VIRTUAL_ROOT, "", queue, cache) {
        warn!(target: "spacesync.reconcile", %error, "catalog walk failed");
    }

    info!(target: "spacesync.reconcile", queued = queue.len(), "full enqueue complete");
    scanning.store(false, Ordering::Release);
}

/// Walk one tree and enqueue every entry below the root, parents before
/// children. Skipped names prune their whole subtree.
pub fn walk_and_enqueue(root: &Path, queue: &EvalQueue, ignore: &IgnoreRules) -> usize {
    let mut count = 0;
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        if entry.path() == root {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        !ignore.should_skip(&name, entry.file_type().is_dir())
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(target: "spacesync.reconcile", %error, "walk error");
                continue;
            }
        };
        if entry.path() == root {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            queue.push(rel.to_string_lossy().into_owned());
            count += 1;
        }
    }
    count
}

/// Depth-first catalog walk: enqueue every known path and warm the
/// inode → path cache along the way.
fn enqueue_catalog_subtree(
    catalog: &Catalog,
    parent_ino: u64,
    parent_path: &str,
    queue: &EvalQueue,
    cache: &PathCache,
) -> SyncResult<()> {
    for child in catalog.list_children(parent_ino)? {
        let rel = if parent_path.is_empty() {
            child.name.clone()
        } else {
            format!("{parent_path}/{}", child.name)
        };

        queue.push(rel.clone());
        cache.set(child.inode, rel.clone());

        if child.kind.is_dir() {
            enqueue_catalog_subtree(catalog, child.inode, &rel, queue, cache)?;
        }
    }
    Ok(())
}
