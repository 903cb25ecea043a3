//! Inode → relative-path cache.
//!
//! Resolving an inode to its path otherwise walks the parent chain through
//! the catalog; the reconcile walk and status emission keep this map warm so
//! repeated lookups under the same directory cost one read lock.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct PathCache {
    paths: RwLock<HashMap<u64, String>>,
}

impl PathCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, inode: u64) -> Option<String> {
        self.paths
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&inode)
            .cloned()
    }

    pub fn set(&self, inode: u64, path: impl Into<String>) {
        self.paths
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(inode, path.into());
    }

    pub fn invalidate(&self, inode: u64) {
        self.paths
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&inode);
    }

    pub fn clear(&self) {
        self.paths
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
