//! Shared vocabulary for the spacesync convergence engine.
//!
//! This crate owns the unified error type, the catalog entry model, the
//! seven-variable path state with its scenario classification, the file-type
//! classifier, and the cooperative cancellation token. Everything here is
//! free of I/O so both the catalog and the engine can depend on it.

pub mod cancel;
pub mod error;
pub mod file_type;
pub mod state;
pub mod types;

pub use cancel::CancelToken;
pub use error::{SyncError, SyncResult};
pub use file_type::classify_name;
pub use state::{PathState, UiStatus};
pub use types::{Entry, EntryKind, SpacesView, VIRTUAL_ROOT};
