//! Atomic file operations the pipeline is built on.
//!
//! `safe_copy` never exposes a partial destination: bytes are staged into a
//! sibling temporary and published by a single rename, and every failure
//! path unlinks the temporary. `soft_delete` moves mirrors into a dated
//! trash directory with a single rename, preserving the inode.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use spacesync_core::{CancelToken, SyncError, SyncResult};

/// Copy granularity; cancellation and the re-enqueue hint are polled between
/// chunks.
pub const COPY_CHUNK_SIZE: usize = 256 * 1024;

/// Staging suffix appended to the destination while a copy is in flight.
pub const TMP_SUFFIX: &str = ".sync-tmp";

/// Marker inserted before the extension of preserved conflict copies.
pub const CONFLICT_MARKER: &str = "_conflict-";

/// Disk observation of one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub inode: u64,
    pub size: i64,
    /// Modification time, nanoseconds since the epoch.
    pub mtime_ns: i64,
    pub is_dir: bool,
}

/// Stat a path, following symlinks. `None` when the path does not exist or
/// cannot be observed.
#[must_use]
pub fn stat_path(path: &Path) -> Option<FileStat> {
    let md = fs::metadata(path).ok()?;
    Some(FileStat {
        inode: md.ino(),
        size: md.size() as i64,
        mtime_ns: md.mtime() * 1_000_000_000 + md.mtime_nsec(),
        is_dir: md.is_dir(),
    })
}

/// Copy `src` to `dst` without ever exposing a partial destination.
///
/// The source mtime is recorded up front and verified again after the last
/// chunk; a change fails the copy with [`SyncError::SourceModified`]. Between
/// chunks the ambient cancellation token and the caller's re-enqueue hint
/// are polled. On success `dst` carries the source's bytes and mtime — the
/// mtime stamp is what keeps a freshly propagated mirror clean.
pub fn safe_copy(
    src: &Path,
    dst: &Path,
    cancel: &CancelToken,
    abort_hint: Option<&dyn Fn() -> bool>,
) -> SyncResult<()> {
    let src_md = fs::metadata(src)?;
    let mtime_before = src_md.mtime() * 1_000_000_000 + src_md.mtime_nsec();
    let total_size = src_md.size();

    tracing::debug!(
        target: "spacesync.fileops",
        src = %src.display(),
        dst = %dst.display(),
        size = total_size,
        "copy start"
    );
    let start = Instant::now();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = tmp_path_for(dst);
    let result = stage_and_publish(src, dst, &tmp_path, mtime_before, cancel, abort_hint);
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    } else {
        tracing::debug!(
            target: "spacesync.fileops",
            src = %src.display(),
            dst = %dst.display(),
            size = total_size,
            duration_ms = start.elapsed().as_millis() as u64,
            "copy complete"
        );
    }
    result
}

fn stage_and_publish(
    src: &Path,
    dst: &Path,
    tmp_path: &Path,
    mtime_before: i64,
    cancel: &CancelToken,
    abort_hint: Option<&dyn Fn() -> bool>,
) -> SyncResult<()> {
    let mut src_file = File::open(src)?;
    let mut tmp_file = File::create(tmp_path)?;

    let mut buf = vec![0_u8; COPY_CHUNK_SIZE];
    loop {
        if cancel.is_cancelled() {
            tracing::warn!(target: "spacesync.fileops", src = %src.display(), "copy cancelled");
            return Err(SyncError::Cancelled { phase: "copy" });
        }
        if let Some(hint) = abort_hint {
            if hint() {
                tracing::debug!(
                    target: "spacesync.fileops",
                    dst = %dst.display(),
                    "copy abandoned, path re-enqueued"
                );
                return Err(SyncError::Requeued {
                    path: dst.to_path_buf(),
                });
            }
        }

        let n = src_file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        tmp_file.write_all(&buf[..n])?;
    }

    // Verify the source held still for the whole read.
    let src_md = fs::metadata(src)?;
    let mtime_after = src_md.mtime() * 1_000_000_000 + src_md.mtime_nsec();
    if mtime_after != mtime_before {
        tracing::warn!(
            target: "spacesync.fileops",
            src = %src.display(),
            "source modified during copy"
        );
        return Err(SyncError::SourceModified {
            path: src.to_path_buf(),
        });
    }

    // Stamp the destination with the source mtime, then publish.
    tmp_file.set_modified(src_md.modified()?)?;
    tmp_file.sync_all()?;
    drop(tmp_file);
    fs::rename(tmp_path, dst)?;
    Ok(())
}

fn tmp_path_for(dst: &Path) -> PathBuf {
    let mut os = dst.as_os_str().to_os_string();
    os.push(TMP_SUFFIX);
    PathBuf::from(os)
}

/// Move `path` into `trash_root/YYYY-MM-DD/`, suffixing `_N` before the
/// extension on name collisions. A single rename, so the inode is preserved.
/// Returns the final trash path.
pub fn soft_delete(path: &Path, trash_root: &Path) -> SyncResult<PathBuf> {
    let date_dir = trash_root.join(chrono::Local::now().format("%Y-%m-%d").to_string());
    fs::create_dir_all(&date_dir)?;

    let base = file_name(path)?;
    let mut trash_path = date_dir.join(base);
    if trash_path.exists() {
        let (stem, ext) = split_stem_ext(base);
        for n in 1.. {
            trash_path = date_dir.join(format!("{stem}_{n}{ext}"));
            if !trash_path.exists() {
                break;
            }
        }
    }

    fs::rename(path, &trash_path)?;
    tracing::info!(
        target: "spacesync.fileops",
        path = %path.display(),
        trash = %trash_path.display(),
        "soft delete"
    );
    Ok(trash_path)
}

/// Smallest-N conflict basename for `original` that no sibling already uses.
/// Touches disk only through `stat`.
#[must_use]
pub fn conflict_name(original: &Path) -> String {
    let dir = original.parent().unwrap_or_else(|| Path::new(""));
    let base = original
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, ext) = split_stem_ext(&base);

    let mut n = 1_u32;
    loop {
        let candidate = format!("{stem}{CONFLICT_MARKER}{n}{ext}");
        if !dir.join(&candidate).exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Rename `path` to its conflict name; returns the new path.
pub fn rename_conflict(path: &Path) -> SyncResult<PathBuf> {
    let name = conflict_name(path);
    let new_path = path.with_file_name(&name);
    fs::rename(path, &new_path)?;
    tracing::info!(
        target: "spacesync.fileops",
        old = %path.display(),
        new = %new_path.display(),
        "conflict rename"
    );
    Ok(new_path)
}

fn file_name(path: &Path) -> SyncResult<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SyncError::not_found(format!("basename of {}", path.display())))
}

/// Split a basename into stem and extension; the extension keeps its dot.
/// Hidden names without a further dot have no extension.
fn split_stem_ext(base: &str) -> (&str, &str) {
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, &base[stem.len()..]),
        _ => (base, ""),
    }
}
