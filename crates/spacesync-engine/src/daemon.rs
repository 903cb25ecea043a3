//! Daemon lifecycle: wires the watcher into the queue, drains the queue
//! through the pipeline, and fans out status events.
//!
//! Exactly one worker processes the queue, which serializes every mutation
//! of catalog rows and disk paths. A failed pass is rolled back (catalog
//! aligned to disk reality — disk is truth), retried once after a backoff,
//! and then left to the next event.

use std::sync::atomic::AtomicBool;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;

use spacesync_catalog::Catalog;
use spacesync_core::{CancelToken, SpacesView, SyncResult};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::diagnostics::ErrorLog;
use crate::events::{EventBus, SyncEvent};
use crate::fileops::stat_path;
use crate::ignore::IgnoreRules;
use crate::path_cache::PathCache;
use crate::pipeline::{lookup_path, now_nanos, Pipeline};
use crate::queue::EvalQueue;
use crate::reconcile::enqueue_all;
use crate::selection::Selection;
use crate::view::CatalogView;
use crate::watcher::SyncWatcher;

/// The convergence daemon. Owns the queue, the watcher, the worker-side
/// catalog connection, both roots and the status publisher.
pub struct SyncDaemon {
    config: EngineConfig,
    catalog: Catalog,
    queue: Arc<EvalQueue>,
    events: Arc<EventBus>,
    errors: Arc<ErrorLog>,
    ignore: Arc<IgnoreRules>,
    cache: Arc<PathCache>,
    scanning: Arc<AtomicBool>,
}

impl SyncDaemon {
    /// Build a daemon over an already-open catalog connection.
    #[must_use]
    pub fn new(config: EngineConfig, catalog: Catalog) -> Self {
        let ignore = IgnoreRules::load(&config.ignore_path());
        Self {
            config,
            catalog,
            queue: Arc::new(EvalQueue::new()),
            events: Arc::new(EventBus::new()),
            errors: Arc::new(ErrorLog::new()),
            ignore: Arc::new(ignore),
            cache: Arc::new(PathCache::new()),
            scanning: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open the catalog at the configured location and build the daemon.
    pub fn open(config: EngineConfig) -> SyncResult<Self> {
        let catalog = Catalog::open(config.catalog_config())?;
        Ok(Self::new(config, catalog))
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<EvalQueue> {
        &self.queue
    }

    #[must_use]
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    #[must_use]
    pub fn errors(&self) -> &Arc<ErrorLog> {
        &self.errors
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Selection surface over the worker catalog connection. External
    /// callers running on their own threads should instead pair their own
    /// catalog connection with [`SyncDaemon::queue`].
    #[must_use]
    pub fn selection(&self) -> Selection<'_> {
        Selection::new(&self.catalog, &self.queue)
    }

    /// Read surface over the worker catalog connection.
    #[must_use]
    pub fn view(&self) -> CatalogView<'_> {
        CatalogView::new(
            &self.catalog,
            &self.config.archives_root,
            &self.config.spaces_root,
        )
    }

    /// Run until cancelled: start the watcher, seed the queue with the full
    /// walk, then drain the queue one path at a time.
    pub fn run(&self, cancel: &CancelToken) {
        info!(
            target: "spacesync.daemon",
            archives = %self.config.archives_root.display(),
            spaces = %self.config.spaces_root.display(),
            trash = %self.config.trash_root().display(),
            "daemon starting"
        );

        // Watcher first, so nothing slips between the walk and the watches.
        let mut watcher = match SyncWatcher::spawn(
            &self.config.archives_root,
            &self.config.spaces_root,
            Arc::clone(&self.queue),
            Arc::clone(&self.ignore),
            self.config.debounce(),
        ) {
            Ok(watcher) => watcher,
            Err(err) => {
                error!(target: "spacesync.daemon", %err, "watcher failed to start, daemon aborting");
                self.errors.record("watcher", err.to_string());
                return;
            }
        };
        let overflow_handler = watcher
            .take_overflow()
            .map(|rx| self.spawn_overflow_handler(rx));

        enqueue_all(
            &self.catalog,
            &self.config.archives_root,
            &self.config.spaces_root,
            &self.ignore,
            &self.queue,
            &self.cache,
            &self.scanning,
        );

        info!(target: "spacesync.daemon", "worker loop started");
        let mut processed = 0_u64;
        while let Some(rel) = self.queue.pop(cancel) {
            self.process_path(&rel, cancel);
            processed += 1;
            if cancel.is_cancelled() {
                break;
            }
        }
        info!(target: "spacesync.daemon", processed, "worker loop stopped");

        watcher.close();
        if let Some(handle) = overflow_handler {
            if handle.join().is_err() {
                warn!(target: "spacesync.daemon", "overflow handler panicked during shutdown");
            }
        }
        info!(target: "spacesync.daemon", "daemon stopped");
    }

    /// One pass over a path, with rollback and a single retry on failure.
    fn process_path(&self, rel: &str, cancel: &CancelToken) {
        let trash_root = self.config.trash_root();
        let pipeline = Pipeline::new(
            &self.catalog,
            &self.config.archives_root,
            &self.config.spaces_root,
            &trash_root,
            cancel,
        );
        let abort_hint = || self.queue.has(rel);

        match pipeline.run(rel, &abort_hint) {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => return,
            Err(err) if err.is_transient_race() => {
                debug!(target: "spacesync.daemon", path = rel, %err, "pass superseded, ending early");
            }
            Err(err) => {
                warn!(target: "spacesync.daemon", path = rel, %err, "pipeline failed, rolling back");
                self.errors.record("pipeline", err.to_string());
                self.rollback(rel);
                self.emit_status(rel);

                if cancel.sleep_interruptible(self.config.retry_backoff()) {
                    return;
                }

                match pipeline.run(rel, &abort_hint) {
                    Ok(()) => {}
                    Err(retry_err) if retry_err.is_cancelled() => return,
                    Err(retry_err) if retry_err.is_transient_race() => {
                        debug!(target: "spacesync.daemon", path = rel, %retry_err, "retry superseded");
                    }
                    Err(retry_err) => {
                        error!(
                            target: "spacesync.daemon",
                            path = rel,
                            %retry_err,
                            "retry failed, rollback maintained"
                        );
                        self.errors.record("pipeline", retry_err.to_string());
                        self.rollback(rel);
                    }
                }
            }
        }

        self.emit_status(rel);
    }

    /// Align the catalog with disk reality after a failed pass. The two
    /// trees are ground truth: if the pipeline could not change disk, the
    /// catalog moves instead.
    fn rollback(&self, rel: &str) {
        let spaces_stat = stat_path(&self.config.spaces_path(rel));
        let (entry, view) = match lookup_path(&self.catalog, rel) {
            Ok(found) => found,
            Err(err) => {
                error!(target: "spacesync.daemon", path = rel, %err, "rollback lookup failed");
                return;
            }
        };
        let Some(entry) = entry else {
            return;
        };

        if spaces_stat.is_some() && !entry.selected {
            if let Err(err) = self.catalog.set_selected(&[entry.inode], true) {
                error!(target: "spacesync.daemon", path = rel, %err, "rollback set_selected failed");
                return;
            }
            warn!(target: "spacesync.daemon", path = rel, "rollback: selected=true, mirror exists");
        } else if spaces_stat.is_none() && entry.selected {
            if let Err(err) = self.catalog.set_selected(&[entry.inode], false) {
                error!(target: "spacesync.daemon", path = rel, %err, "rollback set_selected failed");
                return;
            }
            warn!(target: "spacesync.daemon", path = rel, "rollback: selected=false, mirror missing");
        }

        match (spaces_stat, view) {
            (Some(stat), None) => {
                let _ = self.catalog.upsert_spaces_view(&SpacesView {
                    entry_ino: entry.inode,
                    synced_mtime: stat.mtime_ns,
                    checked_at: now_nanos(),
                });
            }
            (None, Some(view)) => {
                let _ = self.catalog.delete_spaces_view(view.entry_ino);
            }
            _ => {}
        }
    }

    /// Publish the current status of a path to subscribers and keep the
    /// inode → path cache warm.
    fn emit_status(&self, rel: &str) {
        let (entry, view) = match lookup_path(&self.catalog, rel) {
            Ok(found) => found,
            Err(_) => return,
        };
        let Some(entry) = entry else {
            return;
        };

        let archives_mtime = stat_path(&self.config.archives_path(rel)).map(|s| s.mtime_ns);
        let spaces_mtime = stat_path(&self.config.spaces_path(rel)).map(|s| s.mtime_ns);
        let state = spacesync_core::PathState::compute(
            Some(&entry),
            view.as_ref(),
            archives_mtime,
            spaces_mtime,
        );

        self.cache.set(entry.inode, rel);

        let mut event = SyncEvent::status(entry.inode, &entry.name, state.ui_status().as_str());
        if entry.kind.is_dir() {
            if let Ok(counts) = self.catalog.child_counts(entry.inode) {
                event.child_total_count = Some(counts.total);
                event.child_stable_count = Some(counts.stable);
            }
        }
        self.events.publish(&event);
    }

    fn spawn_overflow_handler(&self, overflow: Receiver<()>) -> thread::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let ignore = Arc::clone(&self.ignore);
        let cache = Arc::clone(&self.cache);
        let scanning = Arc::clone(&self.scanning);
        let config = self.config.clone();

        thread::Builder::new()
            .name("spacesync-overflow".to_owned())
            .spawn(move || {
                while overflow.recv().is_ok() {
                    info!(target: "spacesync.daemon", "overflow received, re-enqueueing the world");
                    // The worker owns the daemon's connection; this thread
                    // walks the catalog through its own.
                    match Catalog::open(config.catalog_config()) {
                        Ok(catalog) => enqueue_all(
                            &catalog,
                            &config.archives_root,
                            &config.spaces_root,
                            &ignore,
                            &queue,
                            &cache,
                            &scanning,
                        ),
                        Err(err) => {
                            error!(target: "spacesync.daemon", %err, "overflow re-walk failed to open catalog");
                        }
                    }
                }
            })
            .expect("overflow handler thread spawns")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacesync_core::{Entry, EntryKind};
    use std::fs;

    struct Fixture {
        _tmp: tempfile::TempDir,
        daemon: SyncDaemon,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().expect("tempdir");
        let archives = tmp.path().join("archives");
        let spaces = tmp.path().join("spaces");
        let config_dir = tmp.path().join("config");
        for dir in [&archives, &spaces, &config_dir] {
            fs::create_dir_all(dir).expect("fixture dirs");
        }
        let config = EngineConfig::new(&archives, &spaces, &config_dir);
        let daemon = SyncDaemon::open(config).expect("daemon opens");
        Fixture { _tmp: tmp, daemon }
    }

    fn register(daemon: &SyncDaemon, rel: &str, selected: bool) -> u64 {
        let path = daemon.config().archives_path(rel);
        let stat = stat_path(&path).expect("fixture file on disk");
        daemon
            .catalog()
            .upsert_entry(&Entry {
                inode: stat.inode,
                parent_ino: 0,
                name: rel.to_owned(),
                kind: EntryKind::Text,
                size: Some(stat.size),
                mtime: stat.mtime_ns,
                selected,
            })
            .expect("register fixture entry");
        stat.inode
    }

    #[test]
    fn rollback_aligns_selected_with_missing_mirror() {
        let fx = fixture();
        fs::write(fx.daemon.config().archives_path("doc.txt"), "x").expect("file");
        let inode = register(&fx.daemon, "doc.txt", true);

        // Selected but no mirror on disk and no view: selection is withdrawn.
        fx.daemon.rollback("doc.txt");
        let entry = fx
            .daemon
            .catalog()
            .get_entry(inode)
            .expect("row")
            .expect("present");
        assert!(!entry.selected);
    }

    #[test]
    fn rollback_adopts_existing_mirror() {
        let fx = fixture();
        fs::write(fx.daemon.config().archives_path("doc.txt"), "x").expect("archives file");
        fs::write(fx.daemon.config().spaces_path("doc.txt"), "x").expect("mirror file");
        let inode = register(&fx.daemon, "doc.txt", false);

        // Mirror exists but the row says unselected and has no view.
        fx.daemon.rollback("doc.txt");
        let entry = fx
            .daemon
            .catalog()
            .get_entry(inode)
            .expect("row")
            .expect("present");
        assert!(entry.selected, "disk wins: the mirror is adopted");
        assert!(
            fx.daemon
                .catalog()
                .get_spaces_view(inode)
                .expect("view lookup")
                .is_some(),
            "a view row is created from the mirror mtime"
        );
    }

    #[test]
    fn rollback_drops_stale_view() {
        let fx = fixture();
        fs::write(fx.daemon.config().archives_path("doc.txt"), "x").expect("archives file");
        let inode = register(&fx.daemon, "doc.txt", false);
        fx.daemon
            .catalog()
            .upsert_spaces_view(&SpacesView {
                entry_ino: inode,
                synced_mtime: 1,
                checked_at: 1,
            })
            .expect("stale view");

        fx.daemon.rollback("doc.txt");
        assert!(
            fx.daemon
                .catalog()
                .get_spaces_view(inode)
                .expect("view lookup")
                .is_none(),
            "no mirror on disk means no view row"
        );
    }

    #[test]
    fn emit_status_publishes_to_subscribers() {
        let fx = fixture();
        fs::write(fx.daemon.config().archives_path("doc.txt"), "x").expect("file");
        let inode = register(&fx.daemon, "doc.txt", false);

        let (_id, rx) = fx.daemon.events().subscribe();
        fx.daemon.emit_status("doc.txt");

        let event = rx.try_recv().expect("status event");
        assert_eq!(event.inode, inode);
        assert_eq!(event.name, "doc.txt");
        assert!(!event.status.is_empty());
    }

    #[test]
    fn emit_status_warms_path_cache() {
        let fx = fixture();
        fs::write(fx.daemon.config().archives_path("doc.txt"), "x").expect("file");
        let inode = register(&fx.daemon, "doc.txt", false);

        fx.daemon.emit_status("doc.txt");
        assert_eq!(fx.daemon.cache.get(inode).as_deref(), Some("doc.txt"));
    }
}
