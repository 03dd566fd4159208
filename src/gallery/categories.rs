use std::collections::HashMap;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{info, warn};

use super::view::{cache_view, CacheView, LoadFn, RefreshFn};
use super::{Gallery, RefreshOutcome};
use crate::cache::{CacheError, CacheTable, Category};
use crate::drive::RemoteEntry;

/// Group root-folder entries into categories.
///
/// Entries sharing the name prefix before the first `.` form one category:
/// the folder supplies the id, any other entry (a background image or gif)
/// supplies the background id. Groups keep the order in which their first
/// entry was listed.
pub fn to_categories(entries: &[RemoteEntry]) -> Vec<Category> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&RemoteEntry>> = HashMap::new();

    for entry in entries {
        let prefix = entry.name.split('.').next().unwrap_or_default();
        groups
            .entry(prefix)
            .or_insert_with(|| {
                order.push(prefix);
                Vec::new()
            })
            .push(entry);
    }

    order
        .into_iter()
        .map(|prefix| {
            let members = &groups[prefix];
            let id = members
                .iter()
                .find(|e| e.is_folder())
                .map(|e| e.id.clone())
                .unwrap_or_default();
            let background_id = members
                .iter()
                .find(|e| !e.is_folder())
                .map(|e| e.id.clone())
                .unwrap_or_default();
            Category {
                id,
                name: prefix.to_string(),
                background_id,
            }
        })
        .collect()
}

impl Gallery {
    /// Replace the cached categories with the current remote listing.
    ///
    /// A failed listing leaves the cache untouched and is reported as
    /// [`RefreshOutcome::RemoteUnavailable`]; only cache failures are errors.
    pub async fn refresh_categories(&self) -> Result<RefreshOutcome, CacheError> {
        let entries = match self.remote.list_categories().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Category listing failed, keeping cached categories");
                return Ok(RefreshOutcome::RemoteUnavailable);
            }
        };

        let categories = to_categories(&entries);
        self.cache.replace_categories(&categories).await?;

        info!(count = categories.len(), "Refreshed categories");
        Ok(RefreshOutcome::Refreshed {
            count: categories.len(),
        })
    }

    /// Cached categories, refreshed from the remote once if the cache
    /// starts out empty.
    pub fn watch_categories(self: &Arc<Self>) -> CacheView<Category> {
        let load: LoadFn<Category> = {
            let cache = Arc::clone(&self.cache);
            Box::new(move || {
                let cache = Arc::clone(&cache);
                async move { cache.categories().await }.boxed()
            })
        };
        let refresh: RefreshFn = {
            let gallery = Arc::clone(self);
            Box::new(move || {
                let gallery = Arc::clone(&gallery);
                async move {
                    if let Err(e) = gallery.refresh_categories().await {
                        warn!(error = %e, "Category refresh on empty cache failed");
                    }
                }
                .boxed()
            })
        };

        cache_view(
            self.cache.subscribe(CacheTable::Category),
            load,
            Some(refresh),
        )
    }
}
