//! Gallery sync — reconciles remote listings into the local cache.
//!
//! Categories are replaced wholesale on refresh. Pictures are replaced one
//! category at a time, carrying each picture's favourite flag across the
//! replace. Remote failures never touch the cache.

mod categories;
mod pictures;
pub mod view;

pub use view::CacheView;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::cache::CacheStore;
use crate::drive::RemoteListing;

/// Result of a refresh that did not hit a cache error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The cache now holds `count` rows for the refreshed scope.
    Refreshed { count: usize },
    /// The remote listing failed; the cache was left as it was.
    RemoteUnavailable,
}

pub struct Gallery {
    remote: Arc<dyn RemoteListing>,
    cache: Arc<dyn CacheStore>,
    /// Serializes picture refreshes and favourite toggles per category.
    category_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for Gallery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gallery").finish_non_exhaustive()
    }
}

impl Gallery {
    pub fn new(remote: Arc<dyn RemoteListing>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            remote,
            cache,
            category_locks: Mutex::new(HashMap::new()),
        }
    }

    fn category_lock(&self, category_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .category_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Entries only the map still holds are idle; drop them.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(category_id.to_string()).or_default())
    }
}
