//! The single external write surface: flipping the selected flag.
//!
//! A selection change is two steps — one atomic catalog update over the
//! inodes and their descendants, then a priority enqueue of every affected
//! path so the pipeline realizes the new intent ahead of background
//! traffic. Tree contents themselves evolve only through direct disk
//! editing, which the watcher picks up.

use spacesync_catalog::Catalog;
use spacesync_core::{Entry, SyncError, SyncResult, VIRTUAL_ROOT};
use tracing::info;

use crate::queue::EvalQueue;

/// Bound on parent-chain walks; the tree invariant (parents are strictly
/// shallower) makes deeper chains impossible.
const MAX_DEPTH: usize = 4_096;

/// Selection mutation surface over a catalog and the evaluation queue.
pub struct Selection<'a> {
    catalog: &'a Catalog,
    queue: &'a EvalQueue,
}

impl<'a> Selection<'a> {
    #[must_use]
    pub fn new(catalog: &'a Catalog, queue: &'a EvalQueue) -> Self {
        Self { catalog, queue }
    }

    /// Mark the inodes (and all their descendants) for mirroring.
    pub fn select(&self, inodes: &[u64]) -> SyncResult<()> {
        self.apply(inodes, true)
    }

    /// Withdraw the inodes (and all their descendants) from mirroring.
    pub fn deselect(&self, inodes: &[u64]) -> SyncResult<()> {
        self.apply(inodes, false)
    }

    fn apply(&self, inodes: &[u64], selected: bool) -> SyncResult<()> {
        if inodes.is_empty() {
            return Err(SyncError::Invalid {
                field: "inodes",
                reason: "list is empty".to_owned(),
            });
        }
        if inodes.contains(&VIRTUAL_ROOT) {
            return Err(SyncError::Invalid {
                field: "inodes",
                reason: "the virtual root is not selectable".to_owned(),
            });
        }

        info!(
            target: "spacesync.selection",
            count = inodes.len(),
            selected,
            "selection change"
        );
        self.catalog.set_selected(inodes, selected)?;

        for &inode in inodes {
            let Some(entry) = self.catalog.get_entry(inode)? else {
                continue;
            };
            let Some(rel) = self.resolve_rel_path(&entry)? else {
                continue;
            };
            self.queue.push_priority(rel.clone());
            if entry.kind.is_dir() {
                self.enqueue_descendants(entry.inode, &rel)?;
            }
        }
        Ok(())
    }

    /// Build the relative path of an entry by walking its parent chain.
    fn resolve_rel_path(&self, entry: &Entry) -> SyncResult<Option<String>> {
        let mut parts = vec![entry.name.clone()];
        let mut parent_ino = entry.parent_ino;
        for _ in 0..MAX_DEPTH {
            if parent_ino == VIRTUAL_ROOT {
                parts.reverse();
                return Ok(Some(parts.join("/")));
            }
            match self.catalog.get_entry(parent_ino)? {
                Some(parent) => {
                    parts.push(parent.name.clone());
                    parent_ino = parent.parent_ino;
                }
                None => return Ok(None),
            }
        }
        Ok(None)
    }

    fn enqueue_descendants(&self, parent_ino: u64, parent_path: &str) -> SyncResult<()> {
        for child in self.catalog.list_children(parent_ino)? {
            let rel = format!("{parent_path}/{}", child.name);
            self.queue.push_priority(rel.clone());
            if child.kind.is_dir() {
                self.enqueue_descendants(child.inode, &rel)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacesync_core::{CancelToken, EntryKind};

    fn entry(inode: u64, parent: u64, name: &str, kind: EntryKind) -> Entry {
        Entry {
            inode,
            parent_ino: parent,
            name: name.to_owned(),
            kind,
            size: if kind.is_dir() { None } else { Some(1) },
            mtime: 1,
            selected: false,
        }
    }

    fn fixture() -> Catalog {
        let catalog = Catalog::open_in_memory().expect("catalog");
        catalog.upsert_entry(&entry(1, 0, "docs", EntryKind::Dir)).expect("docs");
        catalog
            .upsert_entry(&entry(2, 1, "a.txt", EntryKind::Text))
            .expect("a");
        catalog.upsert_entry(&entry(3, 1, "sub", EntryKind::Dir)).expect("sub");
        catalog
            .upsert_entry(&entry(4, 3, "deep.txt", EntryKind::Text))
            .expect("deep");
        catalog
    }

    #[test]
    fn empty_inode_list_is_rejected() {
        let catalog = Catalog::open_in_memory().expect("catalog");
        let queue = EvalQueue::new();
        let err = Selection::new(&catalog, &queue)
            .select(&[])
            .expect_err("must reject");
        assert!(matches!(err, SyncError::Invalid { .. }));
    }

    #[test]
    fn virtual_root_is_not_selectable() {
        let catalog = Catalog::open_in_memory().expect("catalog");
        let queue = EvalQueue::new();
        let err = Selection::new(&catalog, &queue)
            .select(&[VIRTUAL_ROOT])
            .expect_err("must reject");
        assert!(matches!(err, SyncError::Invalid { .. }));
    }

    #[test]
    fn selecting_directory_flags_and_enqueues_subtree() {
        let catalog = fixture();
        let queue = EvalQueue::new();
        Selection::new(&catalog, &queue).select(&[1]).expect("select");

        for inode in [1, 2, 3, 4] {
            assert!(
                catalog.get_entry(inode).expect("row").expect("present").selected,
                "inode {inode} flagged"
            );
        }
        for rel in ["docs", "docs/a.txt", "docs/sub", "docs/sub/deep.txt"] {
            assert!(queue.has(rel), "{rel} should be enqueued at priority");
        }

        // Priority paths beat pre-existing normal traffic.
        queue.push("background");
        let cancel = CancelToken::new();
        let first = queue.pop(&cancel).expect("path");
        assert_ne!(first, "background");
    }

    #[test]
    fn deselect_is_symmetric() {
        let catalog = fixture();
        let queue = EvalQueue::new();
        let selection = Selection::new(&catalog, &queue);
        selection.select(&[1]).expect("select");
        queue.drain();

        selection.deselect(&[1]).expect("deselect");
        for inode in [1, 2, 3, 4] {
            assert!(!catalog.get_entry(inode).expect("row").expect("present").selected);
        }
        assert!(queue.has("docs/sub/deep.txt"));
    }

    #[test]
    fn unknown_inodes_are_skipped_quietly() {
        let catalog = fixture();
        let queue = EvalQueue::new();
        Selection::new(&catalog, &queue)
            .select(&[2, 999])
            .expect("unknown inode is not an error");
        assert!(queue.has("docs/a.txt"));
        assert_eq!(queue.len(), 1);
    }
}
