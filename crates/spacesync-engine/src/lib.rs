//! The spacesync convergence engine.
//!
//! Keeps two local trees — Archives (canonical store) and Spaces (working
//! mirror) — eventually consistent with a user-curated selection: every
//! selected entry is materialized on Spaces, every unselected entry is
//! absent from it, and no data written on either side is ever lost.
//!
//! The moving parts, wired together by [`daemon::SyncDaemon`]:
//!
//! - [`fileops`] — safe chunked copy, soft delete into dated trash, conflict
//!   renaming.
//! - [`queue`] — two-tier deduplicating FIFO of relative paths.
//! - [`watcher`] — notify-backed recursive watcher with debounce and an
//!   overflow signal.
//! - [`reconcile`] — the startup/overflow walk seeding the queue.
//! - [`pipeline`] — the five-stage per-path convergence pass.
//! - [`events`] — best-effort status fan-out to subscribers.
//! - [`view`] / [`selection`] — the two external contracts.

pub mod config;
pub mod daemon;
pub mod diagnostics;
pub mod events;
pub mod fileops;
pub mod ignore;
pub mod path_cache;
pub mod pipeline;
pub mod queue;
pub mod reconcile;
pub mod selection;
pub mod tracing_setup;
pub mod view;
pub mod watcher;

pub use config::EngineConfig;
pub use daemon::SyncDaemon;
pub use diagnostics::{ErrorEntry, ErrorLog};
pub use events::{EventBus, SyncEvent};
pub use pipeline::Pipeline;
pub use queue::EvalQueue;
pub use selection::Selection;
pub use tracing_setup::{init_subscriber, Verbosity};
pub use view::{CatalogView, EntryStatus, SyncStats};
pub use watcher::SyncWatcher;
