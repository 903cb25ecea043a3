//! SQLite-backed catalog for the spacesync convergence engine.
//!
//! This crate owns schema bootstrap and migration, all Entry and SpacesView
//! persistence, and the aggregation queries consumed by the external read
//! surface. The catalog is a cache of disk structure plus user intent; the
//! two trees on disk remain ground truth.

pub mod aggregate;
pub mod connection;
pub mod entry;
pub mod schema;

pub use aggregate::{ChildCounts, DirSize, StatusCounts};
pub use connection::{Catalog, CatalogConfig};
pub use schema::SCHEMA_VERSION;
