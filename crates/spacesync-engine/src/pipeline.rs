//! The five-stage convergence pass over one relative path.
//!
//! Each stage only fires when its guard holds, and the seven-variable state
//! is re-read between stages: stages mutate shared ground truth (disk and
//! catalog), so cached observations from before a stage are stale by
//! construction. A pass over an already-converged path performs no writes.
//!
//! Stage order:
//!
//! 1. Archives recovery — a missing Archives file is restored from Spaces,
//!    or the catalog row is retired when both disks are gone.
//! 2. Registration — an unknown Archives file gains a catalog row; a Spaces
//!    twin at the same path is user intent, so it registers as selected.
//! 3. Change propagation — dirty sides are reconciled; when both are dirty
//!    Spaces wins and the Archives bytes are preserved under a conflict
//!    name.
//! 4. Selection realization — the mirror is materialized or soft-deleted to
//!    match the selected flag.
//! 5. View alignment — the spaces-view row is made to agree with the mirror
//!    on disk.

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use spacesync_catalog::Catalog;
use spacesync_core::{
    classify_name, CancelToken, Entry, EntryKind, PathState, SpacesView, SyncError, SyncResult,
    VIRTUAL_ROOT,
};
use tracing::{debug, info};

use crate::fileops::{rename_conflict, safe_copy, soft_delete, stat_path, FileStat};

/// Nanoseconds since the epoch, the timestamp base of all catalog fields.
#[must_use]
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as i64)
}

/// Final path component of a relative path.
#[must_use]
pub fn base_name(rel: &str) -> &str {
    rel.rsplit('/').next().unwrap_or(rel)
}

/// Resolve the catalog row and view for a relative path by walking its
/// components down from the virtual root. Absence is not an error.
pub fn lookup_path(
    catalog: &Catalog,
    rel: &str,
) -> SyncResult<(Option<Entry>, Option<SpacesView>)> {
    let mut parent_ino = VIRTUAL_ROOT;
    let mut entry: Option<Entry> = None;
    for part in rel.split('/').filter(|p| !p.is_empty()) {
        match catalog.get_entry_by_path(parent_ino, part)? {
            Some(e) => {
                parent_ino = e.inode;
                entry = Some(e);
            }
            None => return Ok((None, None)),
        }
    }
    let Some(entry) = entry else {
        return Ok((None, None));
    };
    let view = catalog.get_spaces_view(entry.inode)?;
    Ok((Some(entry), view))
}

/// Resolve the parent inode for a relative path; the virtual root for
/// top-level paths. Fails when a parent component is not yet registered.
pub fn resolve_parent_ino(catalog: &Catalog, rel: &str) -> SyncResult<u64> {
    let mut components: Vec<&str> = rel.split('/').filter(|p| !p.is_empty()).collect();
    components.pop(); // the path itself

    let mut parent_ino = VIRTUAL_ROOT;
    for part in components {
        match catalog.get_entry_by_path(parent_ino, part)? {
            Some(e) => parent_ino = e.inode,
            None => {
                return Err(SyncError::not_found(format!(
                    "parent component {part:?} of {rel:?}"
                )))
            }
        }
    }
    Ok(parent_ino)
}

fn size_of(stat: &FileStat) -> Option<i64> {
    if stat.is_dir {
        None
    } else {
        Some(stat.size)
    }
}

#[derive(Debug)]
struct Observation {
    entry: Option<Entry>,
    view: Option<SpacesView>,
    archives: Option<FileStat>,
    spaces: Option<FileStat>,
    state: PathState,
}

/// One convergence pass over a single path.
pub struct Pipeline<'a> {
    catalog: &'a Catalog,
    archives_root: &'a Path,
    spaces_root: &'a Path,
    trash_root: &'a Path,
    cancel: &'a CancelToken,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub fn new(
        catalog: &'a Catalog,
        archives_root: &'a Path,
        spaces_root: &'a Path,
        trash_root: &'a Path,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            catalog,
            archives_root,
            spaces_root,
            trash_root,
            cancel,
        }
    }

    /// Drive `rel` toward its fixed point. `abort_hint` is polled inside
    /// chunked copies; returning true abandons the copy because a newer
    /// event superseded this pass.
    pub fn run(&self, rel: &str, abort_hint: &dyn Fn() -> bool) -> SyncResult<()> {
        let a_path = self.archives_root.join(rel);
        let s_path = self.spaces_root.join(rel);

        let mut obs = self.observe(rel, &a_path, &s_path)?;
        debug!(
            target: "spacesync.pipeline",
            path = rel,
            scenario = obs.state.scenario(),
            label = %obs.state.ui_status(),
            "evaluating"
        );

        if !obs.state.a_disk {
            self.recover_archives(rel, &a_path, &s_path, &obs, abort_hint)?;
            obs = self.observe(rel, &a_path, &s_path)?;
        }

        if !obs.state.a_db && obs.state.a_disk {
            self.register_entry(rel, &obs)?;
            obs = self.observe(rel, &a_path, &s_path)?;
        }

        if obs.state.a_dirty || obs.state.s_dirty {
            self.propagate_changes(rel, &a_path, &s_path, &obs, abort_hint)?;
            obs = self.observe(rel, &a_path, &s_path)?;
        }

        if obs
            .entry
            .as_ref()
            .is_some_and(|e| e.selected != obs.state.s_disk)
        {
            self.realize_selection(rel, &a_path, &s_path, &obs, abort_hint)?;
            obs = self.observe(rel, &a_path, &s_path)?;
        }

        if obs.state.s_db != obs.state.s_disk {
            self.align_view(rel, &s_path, &obs)?;
        }

        Ok(())
    }

    fn observe(&self, rel: &str, a_path: &Path, s_path: &Path) -> SyncResult<Observation> {
        let archives = stat_path(a_path);
        let spaces = stat_path(s_path);
        let (entry, view) = lookup_path(self.catalog, rel)?;
        let state = PathState::compute(
            entry.as_ref(),
            view.as_ref(),
            archives.map(|s| s.mtime_ns),
            spaces.map(|s| s.mtime_ns),
        );
        Ok(Observation {
            entry,
            view,
            archives,
            spaces,
            state,
        })
    }

    /// Stage 1: the Archives file is gone. Restore it from the mirror, or
    /// retire the catalog row when the mirror is gone too.
    fn recover_archives(
        &self,
        rel: &str,
        a_path: &Path,
        s_path: &Path,
        obs: &Observation,
        abort_hint: &dyn Fn() -> bool,
    ) -> SyncResult<()> {
        if let Some(spaces) = &obs.spaces {
            info!(target: "spacesync.pipeline", path = rel, "restoring archives copy from spaces");
            if spaces.is_dir {
                fs::create_dir_all(a_path)?;
            } else {
                safe_copy(s_path, a_path, self.cancel, Some(abort_hint))?;
            }
            if let Some(entry) = &obs.entry {
                if let Some(stat) = stat_path(a_path) {
                    self.catalog
                        .update_entry_mtime(entry.inode, stat.mtime_ns, size_of(&stat))?;
                }
            }
            return Ok(());
        }

        // Both disks are gone: the row no longer describes anything.
        if let Some(entry) = &obs.entry {
            info!(
                target: "spacesync.pipeline",
                path = rel,
                inode = entry.inode,
                "retiring entry lost on both disks"
            );
            if obs.view.is_some() {
                self.catalog.delete_spaces_view(entry.inode)?;
            }
            self.catalog.delete_entry(entry.inode)?;
        }
        Ok(())
    }

    /// Stage 2: an Archives file without a catalog row. A Spaces twin at the
    /// same path is user intent by construction, so it registers selected.
    fn register_entry(&self, rel: &str, obs: &Observation) -> SyncResult<()> {
        let Some(stat) = &obs.archives else {
            return Ok(());
        };

        let parent_ino = resolve_parent_ino(self.catalog, rel)?;
        let name = base_name(rel);
        let kind = if stat.is_dir {
            EntryKind::Dir
        } else {
            classify_name(name)
        };
        let selected = obs.state.s_disk;

        info!(
            target: "spacesync.pipeline",
            path = rel,
            inode = stat.inode,
            kind = %kind,
            selected,
            "registering entry"
        );
        self.catalog.upsert_entry(&Entry {
            inode: stat.inode,
            parent_ino,
            name: name.to_owned(),
            kind,
            size: size_of(stat),
            mtime: stat.mtime_ns,
            selected,
        })
    }

    /// Stage 3: one or both sides changed since the last convergence.
    fn propagate_changes(
        &self,
        rel: &str,
        a_path: &Path,
        s_path: &Path,
        obs: &Observation,
        abort_hint: &dyn Fn() -> bool,
    ) -> SyncResult<()> {
        let Some(entry) = &obs.entry else {
            return Ok(());
        };

        // Directory mtimes drift whenever children change; recording the
        // fresh values is the whole reconciliation.
        if entry.kind.is_dir() {
            if let Some(stat) = &obs.archives {
                self.catalog
                    .update_entry_mtime(entry.inode, stat.mtime_ns, None)?;
            }
            if let (Some(view), Some(stat)) = (&obs.view, &obs.spaces) {
                self.catalog.upsert_spaces_view(&SpacesView {
                    entry_ino: view.entry_ino,
                    synced_mtime: stat.mtime_ns,
                    checked_at: now_nanos(),
                })?;
            }
            return Ok(());
        }

        if obs.state.a_dirty && obs.state.s_dirty {
            return self.resolve_conflict(rel, a_path, s_path, entry, abort_hint);
        }

        if obs.state.a_dirty {
            let Some(stat) = &obs.archives else {
                return Ok(());
            };
            self.catalog
                .update_entry_mtime(entry.inode, stat.mtime_ns, size_of(stat))?;

            if entry.selected && obs.state.s_disk {
                info!(target: "spacesync.pipeline", path = rel, "propagating archives -> spaces");
                safe_copy(a_path, s_path, self.cancel, Some(abort_hint))?;
                if let Some(s_stat) = stat_path(s_path) {
                    self.catalog.upsert_spaces_view(&SpacesView {
                        entry_ino: entry.inode,
                        synced_mtime: s_stat.mtime_ns,
                        checked_at: now_nanos(),
                    })?;
                }
            }
            return Ok(());
        }

        // Only the mirror changed: the edit flows back into Archives.
        info!(target: "spacesync.pipeline", path = rel, "propagating spaces -> archives");
        safe_copy(s_path, a_path, self.cancel, Some(abort_hint))?;
        if let Some(a_stat) = stat_path(a_path) {
            self.catalog
                .update_entry_mtime(entry.inode, a_stat.mtime_ns, size_of(&a_stat))?;
        }
        if let Some(s_stat) = stat_path(s_path) {
            self.catalog.upsert_spaces_view(&SpacesView {
                entry_ino: entry.inode,
                synced_mtime: s_stat.mtime_ns,
                checked_at: now_nanos(),
            })?;
        }
        Ok(())
    }

    /// Both sides dirty. Spaces wins the original name; the Archives bytes
    /// survive under the smallest free conflict name, still owned by the
    /// original inode (the rename preserves it). The original name gets a
    /// fresh inode from the copy, registered selected, and the view is
    /// retargeted to it.
    fn resolve_conflict(
        &self,
        rel: &str,
        a_path: &Path,
        s_path: &Path,
        entry: &Entry,
        abort_hint: &dyn Fn() -> bool,
    ) -> SyncResult<()> {
        info!(target: "spacesync.pipeline", path = rel, "conflict, preserving archives copy");

        let conflict_path = rename_conflict(a_path)?;
        let conflict_base = conflict_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.catalog.update_entry_name(entry.inode, &conflict_base)?;
        // The preserved copy is archive-only; it must not ask for a mirror,
        // and its recorded mtime must match the bytes it now names.
        self.catalog.set_selected(&[entry.inode], false)?;
        if let Some(conflict_stat) = stat_path(&conflict_path) {
            self.catalog.update_entry_mtime(
                entry.inode,
                conflict_stat.mtime_ns,
                size_of(&conflict_stat),
            )?;
        }

        safe_copy(s_path, a_path, self.cancel, Some(abort_hint))?;

        let a_stat = stat_path(a_path)
            .ok_or_else(|| SyncError::not_found(format!("archives copy of {rel:?}")))?;
        self.catalog.upsert_entry(&Entry {
            inode: a_stat.inode,
            parent_ino: entry.parent_ino,
            name: entry.name.clone(),
            kind: entry.kind,
            size: size_of(&a_stat),
            mtime: a_stat.mtime_ns,
            selected: true,
        })?;

        self.catalog.delete_spaces_view(entry.inode)?;
        if let Some(s_stat) = stat_path(s_path) {
            self.catalog.upsert_spaces_view(&SpacesView {
                entry_ino: a_stat.inode,
                synced_mtime: s_stat.mtime_ns,
                checked_at: now_nanos(),
            })?;
        }
        Ok(())
    }

    /// Stage 4: materialize or remove the mirror to match the selected flag.
    fn realize_selection(
        &self,
        rel: &str,
        a_path: &Path,
        s_path: &Path,
        obs: &Observation,
        abort_hint: &dyn Fn() -> bool,
    ) -> SyncResult<()> {
        let Some(entry) = &obs.entry else {
            return Ok(());
        };

        if entry.selected && !obs.state.s_disk {
            // The flag may have flipped since this pass started.
            let fresh = self.catalog.get_entry(entry.inode)?;
            if !fresh.is_some_and(|e| e.selected) {
                debug!(target: "spacesync.pipeline", path = rel, "deselected mid-pass, skipping");
                return Ok(());
            }

            info!(target: "spacesync.pipeline", path = rel, "materializing on spaces");
            if entry.kind.is_dir() {
                fs::create_dir_all(s_path)?;
            } else {
                safe_copy(a_path, s_path, self.cancel, Some(abort_hint))?;
            }
            if let Some(s_stat) = stat_path(s_path) {
                self.catalog.upsert_spaces_view(&SpacesView {
                    entry_ino: entry.inode,
                    synced_mtime: s_stat.mtime_ns,
                    checked_at: now_nanos(),
                })?;
            }
            return Ok(());
        }

        if !entry.selected && obs.state.s_disk {
            info!(target: "spacesync.pipeline", path = rel, "removing mirror into trash");
            // The view row is retired by the alignment stage.
            soft_delete(s_path, self.trash_root)?;
        }
        Ok(())
    }

    /// Stage 5: make the view row agree with the mirror on disk.
    fn align_view(&self, rel: &str, s_path: &Path, obs: &Observation) -> SyncResult<()> {
        if obs.state.s_disk && !obs.state.s_db {
            let Some(entry) = &obs.entry else {
                return Ok(());
            };
            let Some(s_stat) = stat_path(s_path) else {
                return Ok(());
            };
            debug!(target: "spacesync.pipeline", path = rel, "creating spaces view");
            return self.catalog.upsert_spaces_view(&SpacesView {
                entry_ino: entry.inode,
                synced_mtime: s_stat.mtime_ns,
                checked_at: now_nanos(),
            });
        }

        if !obs.state.s_disk && obs.state.s_db {
            if let Some(view) = &obs.view {
                debug!(target: "spacesync.pipeline", path = rel, "removing stale spaces view");
                self.catalog.delete_spaces_view(view.entry_ino)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_takes_last_component() {
        assert_eq!(base_name("a/b/c.txt"), "c.txt");
        assert_eq!(base_name("c.txt"), "c.txt");
    }

    #[test]
    fn lookup_walks_components() {
        let catalog = Catalog::open_in_memory().expect("catalog");
        catalog
            .upsert_entry(&Entry {
                inode: 1,
                parent_ino: VIRTUAL_ROOT,
                name: "a".to_owned(),
                kind: EntryKind::Dir,
                size: None,
                mtime: 1,
                selected: false,
            })
            .expect("dir");
        catalog
            .upsert_entry(&Entry {
                inode: 2,
                parent_ino: 1,
                name: "b.txt".to_owned(),
                kind: EntryKind::Text,
                size: Some(1),
                mtime: 1,
                selected: false,
            })
            .expect("file");

        let (entry, view) = lookup_path(&catalog, "a/b.txt").expect("lookup");
        assert_eq!(entry.expect("present").inode, 2);
        assert!(view.is_none());

        let (entry, _) = lookup_path(&catalog, "a/missing.txt").expect("lookup");
        assert!(entry.is_none());

        let (entry, _) = lookup_path(&catalog, "missing/b.txt").expect("lookup");
        assert!(entry.is_none());
    }

    #[test]
    fn resolve_parent_of_top_level_is_virtual_root() {
        let catalog = Catalog::open_in_memory().expect("catalog");
        assert_eq!(
            resolve_parent_ino(&catalog, "top.txt").expect("resolve"),
            VIRTUAL_ROOT
        );
    }

    #[test]
    fn resolve_parent_fails_on_unregistered_component() {
        let catalog = Catalog::open_in_memory().expect("catalog");
        let err = resolve_parent_ino(&catalog, "ghost/d.txt").expect_err("must fail");
        assert!(matches!(err, SyncError::NotFound { .. }));
    }
}
