use std::path::PathBuf;

/// Unified error type covering all failure modes of the convergence engine.
///
/// Two variants are not failures in the usual sense: [`SyncError::SourceModified`]
/// and [`SyncError::Requeued`] are expected outcomes in a racy environment —
/// they end the current evaluation pass normally and the path converges on its
/// next event. Only cancellation stops the worker.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Catalog operation failed (driver error, schema mismatch, constraint
    /// violation).
    #[error("catalog error: {source}")]
    Storage {
        /// The underlying driver error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Wraps `std::io::Error` for filesystem operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A copy detected that the source file changed while it was being read.
    /// The staged temporary is discarded; nothing is published.
    #[error("source modified during copy: {path}")]
    SourceModified {
        /// The source that changed underneath the copy.
        path: PathBuf,
    },

    /// A copy was abandoned because its path was re-enqueued for evaluation.
    /// A fresh pass will redo the work against the newer observation.
    #[error("copy abandoned, path re-enqueued: {path}")]
    Requeued {
        /// The destination whose copy was abandoned.
        path: PathBuf,
    },

    /// The ambient cancellation token fired.
    #[error("cancelled during {phase}")]
    Cancelled {
        /// Which phase was active when cancellation was observed.
        phase: &'static str,
    },

    /// A path or inode was absent where the caller required presence.
    #[error("{what} not found")]
    NotFound {
        /// Description of the missing thing (path, inode, parent component).
        what: String,
    },

    /// Malformed input from the external surface.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Which input field was rejected.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Convenience alias used throughout the spacesync crates.
pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Wrap an arbitrary driver error as a catalog failure.
    pub fn storage<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            source: Box::new(source),
        }
    }

    /// Construct a [`SyncError::NotFound`] from anything displayable.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Whether this error is an ordinary race outcome that ends the current
    /// evaluation pass without rollback or retry.
    #[must_use]
    pub const fn is_transient_race(&self) -> bool {
        matches!(self, Self::SourceModified { .. } | Self::Requeued { .. })
    }

    /// Whether this error is the ambient cancellation signal.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
