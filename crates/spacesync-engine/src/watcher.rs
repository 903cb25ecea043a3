//! Filesystem watcher feeding the evaluation queue.
//!
//! Both roots are watched recursively on a dedicated thread. Raw events are
//! debounced: the first event opens a quiet window, later events for any
//! path join the pending set, and when the window closes the whole set is
//! flushed to the queue in one bulk push. Backend overflow (a rescan
//! request) raises a one-shot signal; the daemon answers with a full
//! re-walk, which is cheap because converged paths are no-ops.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use spacesync_core::{SyncError, SyncResult};
use tracing::{debug, info, warn};

use crate::config::rel_from_root;
use crate::ignore::IgnoreRules;
use crate::queue::EvalQueue;

/// Stop-flag poll granularity of the worker loop.
const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(25);

struct WorkerContext {
    archives_root: PathBuf,
    spaces_root: PathBuf,
    queue: Arc<EvalQueue>,
    ignore: Arc<IgnoreRules>,
    debounce: Duration,
    stop: Arc<AtomicBool>,
    overflow_tx: SyncSender<()>,
}

/// Handle over the watcher thread. Closing (or dropping) stops the thread
/// and releases the backend watches.
pub struct SyncWatcher {
    stop: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
    overflow: Option<Receiver<()>>,
}

impl SyncWatcher {
    /// Register recursive watches on both roots and start the worker.
    pub fn spawn(
        archives_root: impl Into<PathBuf>,
        spaces_root: impl Into<PathBuf>,
        queue: Arc<EvalQueue>,
        ignore: Arc<IgnoreRules>,
        debounce: Duration,
    ) -> SyncResult<Self> {
        let archives_root = archives_root.into();
        let spaces_root = spaces_root.into();

        let (event_tx, event_rx) = mpsc::channel::<notify::Result<Event>>();
        let mut backend = notify::recommended_watcher(move |res| {
            // The worker drains this channel; a send failure means shutdown.
            let _ = event_tx.send(res);
        })
        .map_err(watcher_error)?;

        backend
            .watch(&archives_root, RecursiveMode::Recursive)
            .map_err(watcher_error)?;
        info!(target: "spacesync.watcher", root = %archives_root.display(), "watching archives");
        backend
            .watch(&spaces_root, RecursiveMode::Recursive)
            .map_err(watcher_error)?;
        info!(target: "spacesync.watcher", root = %spaces_root.display(), "watching spaces");

        let (overflow_tx, overflow_rx) = mpsc::sync_channel::<()>(1);
        let stop = Arc::new(AtomicBool::new(false));
        let context = WorkerContext {
            archives_root,
            spaces_root,
            queue,
            ignore,
            debounce,
            stop: Arc::clone(&stop),
            overflow_tx,
        };

        let worker = thread::Builder::new()
            .name("spacesync-watcher".to_owned())
            .spawn(move || {
                run_worker_loop(&context, &event_rx);
                // Watches are released when the backend drops with the thread.
                drop(backend);
            })
            .map_err(|error| {
                SyncError::Io(io::Error::other(format!(
                    "failed to spawn watcher worker: {error}"
                )))
            })?;

        Ok(Self {
            stop,
            worker: Some(worker),
            overflow: Some(overflow_rx),
        })
    }

    /// One-shot overflow signal; fires when the backend dropped events and a
    /// full re-walk is required. Can be taken once.
    pub fn take_overflow(&mut self) -> Option<Receiver<()>> {
        self.overflow.take()
    }

    /// Stop the worker and release the watches. Idempotent.
    pub fn close(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(target: "spacesync.watcher", "watcher worker panicked during shutdown");
            }
        }
    }
}

impl Drop for SyncWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

fn watcher_error(error: notify::Error) -> SyncError {
    SyncError::Io(io::Error::other(format!("watcher backend: {error}")))
}

fn run_worker_loop(context: &WorkerContext, event_rx: &Receiver<notify::Result<Event>>) {
    let mut pending: HashSet<String> = HashSet::new();
    let mut flush_at: Option<Instant> = None;

    while !context.stop.load(Ordering::Acquire) {
        match event_rx.recv_timeout(WATCH_POLL_INTERVAL) {
            Ok(result) => handle_result(context, result, &mut pending, &mut flush_at),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        while let Ok(result) = event_rx.try_recv() {
            handle_result(context, result, &mut pending, &mut flush_at);
        }

        let due = flush_at.is_some_and(|at| Instant::now() >= at);
        if due && !pending.is_empty() {
            let batch: Vec<String> = pending.drain().collect();
            info!(target: "spacesync.watcher", count = batch.len(), "debounce window closed, flushing");
            context.queue.push_many(batch);
            flush_at = None;
        }
    }

    debug!(target: "spacesync.watcher", "watcher worker stopping");
}

fn handle_result(
    context: &WorkerContext,
    result: notify::Result<Event>,
    pending: &mut HashSet<String>,
    flush_at: &mut Option<Instant>,
) {
    let event = match result {
        Ok(event) => event,
        Err(error) => {
            warn!(target: "spacesync.watcher", %error, "watcher backend error");
            return;
        }
    };

    if event.need_rescan() {
        warn!(target: "spacesync.watcher", "event overflow, requesting full re-walk");
        match context.overflow_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {}
        }
        return;
    }

    for path in &event.paths {
        let Some(rel) = to_rel_path(context, path) else {
            continue;
        };
        let is_dir = std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false);
        if context.ignore.should_skip_path(&rel, is_dir) {
            continue;
        }

        debug!(target: "spacesync.watcher", path = %rel, "event pending");
        pending.insert(rel);
        *flush_at = Some(Instant::now() + context.debounce);
    }
}

/// Translate an absolute event path to the engine's relative form, trying
/// Archives first, then Spaces. Paths outside both roots are dropped.
fn to_rel_path(context: &WorkerContext, path: &Path) -> Option<String> {
    rel_from_root(&context.archives_root, path)
        .or_else(|| rel_from_root(&context.spaces_root, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn wait_for<F: Fn() -> bool>(what: &str, predicate: F) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if predicate() {
                return;
            }
            thread::sleep(Duration::from_millis(20));
        }
        panic!("timed out waiting for {what}");
    }

    fn fixture() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let tmp = tempfile::tempdir().expect("tempdir");
        let archives = tmp.path().join("archives");
        let spaces = tmp.path().join("spaces");
        fs::create_dir_all(&archives).expect("archives root");
        fs::create_dir_all(&spaces).expect("spaces root");
        (tmp, archives, spaces)
    }

    #[test]
    fn write_in_archives_enqueues_relative_path() {
        let (_tmp, archives, spaces) = fixture();
        let queue = Arc::new(EvalQueue::new());
        let mut watcher = SyncWatcher::spawn(
            &archives,
            &spaces,
            Arc::clone(&queue),
            Arc::new(IgnoreRules::default()),
            Duration::from_millis(50),
        )
        .expect("watcher spawns");

        fs::write(archives.join("doc.txt"), "hello").expect("write");

        wait_for("doc.txt in queue", || queue.has("doc.txt"));
        watcher.close();
    }

    #[test]
    fn write_in_spaces_enqueues_relative_path() {
        let (_tmp, archives, spaces) = fixture();
        let queue = Arc::new(EvalQueue::new());
        let mut watcher = SyncWatcher::spawn(
            &archives,
            &spaces,
            Arc::clone(&queue),
            Arc::new(IgnoreRules::default()),
            Duration::from_millis(50),
        )
        .expect("watcher spawns");

        fs::create_dir_all(spaces.join("sub")).expect("subdir");
        fs::write(spaces.join("sub").join("m.bin"), "x").expect("write");

        wait_for("sub/m.bin in queue", || queue.has("sub/m.bin") || queue.has("sub"));
        watcher.close();
    }

    #[test]
    fn hidden_and_conflict_names_are_skipped() {
        let (_tmp, archives, spaces) = fixture();
        let queue = Arc::new(EvalQueue::new());
        let mut watcher = SyncWatcher::spawn(
            &archives,
            &spaces,
            Arc::clone(&queue),
            Arc::new(IgnoreRules::default()),
            Duration::from_millis(50),
        )
        .expect("watcher spawns");

        fs::write(archives.join(".hidden"), "x").expect("write hidden");
        fs::write(archives.join("r_conflict-1.txt"), "x").expect("write conflict");
        fs::write(archives.join("visible.txt"), "x").expect("write visible");

        wait_for("visible.txt in queue", || queue.has("visible.txt"));
        assert!(!queue.has(".hidden"));
        assert!(!queue.has("r_conflict-1.txt"));
        watcher.close();
    }

    #[test]
    fn close_is_idempotent() {
        let (_tmp, archives, spaces) = fixture();
        let mut watcher = SyncWatcher::spawn(
            &archives,
            &spaces,
            Arc::new(EvalQueue::new()),
            Arc::new(IgnoreRules::default()),
            Duration::from_millis(50),
        )
        .expect("watcher spawns");
        watcher.close();
        watcher.close();
    }
}
