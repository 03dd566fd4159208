use std::collections::HashSet;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{debug, info, warn};

use super::view::{cache_view, CacheView, LoadFn, RefreshFn};
use super::{Gallery, RefreshOutcome};
use crate::cache::{CacheError, CacheTable, PictureRecord};
use crate::drive::{FetchedImage, RemoteEntry};

/// Map a category's file listing to fresh, non-favourite picture records.
pub fn to_picture_records(entries: &[RemoteEntry], category_id: &str) -> Vec<PictureRecord> {
    entries
        .iter()
        .map(|e| PictureRecord::new(e.id.clone(), category_id.to_string(), e.name.clone()))
        .collect()
}

/// Mark every record whose id is in `favourites`.
pub fn apply_favourites(records: &mut [PictureRecord], favourites: &HashSet<String>) {
    for record in records.iter_mut() {
        if favourites.contains(&record.id) {
            record.is_favourite = true;
        }
    }
}

impl Gallery {
    /// Replace one category's cached pictures with its current remote
    /// listing, keeping the favourite flag of every picture still listed.
    ///
    /// The favourite snapshot, the clear and the insert happen under the
    /// category's write lock, so a concurrent toggle is never lost.
    pub async fn refresh_pictures(&self, category_id: &str) -> Result<RefreshOutcome, CacheError> {
        let entries = match self.remote.list_files(category_id).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    category_id = %category_id,
                    error = %e,
                    "Picture listing failed, keeping cached pictures"
                );
                return Ok(RefreshOutcome::RemoteUnavailable);
            }
        };

        let lock = self.category_lock(category_id);
        let _guard = lock.lock().await;

        let favourites = self.cache.favourite_ids().await?;
        let mut records = to_picture_records(&entries, category_id);
        apply_favourites(&mut records, &favourites);
        self.cache.replace_pictures(category_id, &records).await?;

        info!(
            category_id = %category_id,
            count = records.len(),
            "Refreshed pictures"
        );
        Ok(RefreshOutcome::Refreshed {
            count: records.len(),
        })
    }

    /// Flip one picture's favourite flag and return the updated record.
    ///
    /// Fails with [`CacheError::NotFound`] if the picture is not cached.
    pub async fn toggle_favourite(&self, picture_id: &str) -> Result<PictureRecord, CacheError> {
        let mut category_id = self.cache.picture(picture_id).await?.category_id;

        let updated = loop {
            let lock = self.category_lock(&category_id);
            let _guard = lock.lock().await;

            // Re-read under the lock; a refresh may have run in between and
            // moved the picture to another category.
            let current = self.cache.picture(picture_id).await?;
            if current.category_id != category_id {
                debug!(
                    picture_id = %picture_id,
                    from = %category_id,
                    to = %current.category_id,
                    "Picture moved category, retrying under its new lock"
                );
                category_id = current.category_id;
                continue;
            }

            let updated = current.toggled();
            self.cache.update_picture(&updated).await?;
            break updated;
        };

        debug!(
            picture_id = %picture_id,
            is_favourite = updated.is_favourite,
            "Toggled favourite"
        );
        Ok(updated)
    }

    /// Download one image. `None` when it cannot be fetched or decoded.
    pub async fn fetch_image(&self, image_id: &str) -> Option<FetchedImage> {
        self.remote.fetch_image(image_id).await
    }

    /// Cached pictures of one category, refreshed from the remote once if
    /// the category starts out empty.
    pub fn watch_pictures(self: &Arc<Self>, category_id: &str) -> CacheView<PictureRecord> {
        let load: LoadFn<PictureRecord> = {
            let cache = Arc::clone(&self.cache);
            let category_id = category_id.to_string();
            Box::new(move || {
                let cache = Arc::clone(&cache);
                let category_id = category_id.clone();
                async move { cache.pictures(&category_id).await }.boxed()
            })
        };
        let refresh: RefreshFn = {
            let gallery = Arc::clone(self);
            let category_id = category_id.to_string();
            Box::new(move || {
                let gallery = Arc::clone(&gallery);
                let category_id = category_id.clone();
                async move {
                    if let Err(e) = gallery.refresh_pictures(&category_id).await {
                        warn!(
                            category_id = %category_id,
                            error = %e,
                            "Picture refresh on empty cache failed"
                        );
                    }
                }
                .boxed()
            })
        };

        cache_view(
            self.cache.subscribe(CacheTable::Picture),
            load,
            Some(refresh),
        )
    }

    /// Favourited pictures across all categories. Never triggers a refresh.
    pub fn watch_favourites(&self) -> CacheView<PictureRecord> {
        let load: LoadFn<PictureRecord> = {
            let cache = Arc::clone(&self.cache);
            Box::new(move || {
                let cache = Arc::clone(&cache);
                async move { cache.favourites().await }.boxed()
            })
        };

        cache_view(self.cache.subscribe(CacheTable::Picture), load, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> RemoteEntry {
        RemoteEntry {
            id: id.to_string(),
            name: String::new(),
            mime_type: String::new(),
        }
    }

    #[test]
    fn test_records_carry_category() {
        let records = to_picture_records(&[entry("P1"), entry("P2")], "F1");
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.category_id == "F1"));
        assert!(records.iter().all(|r| !r.is_favourite));
    }

    #[test]
    fn test_apply_favourites_only_marks_listed_ids() {
        let mut records = to_picture_records(&[entry("P1"), entry("P2")], "F1");
        let favourites: HashSet<String> = ["P2", "P9"].iter().map(|s| s.to_string()).collect();
        apply_favourites(&mut records, &favourites);
        assert!(!records[0].is_favourite);
        assert!(records[1].is_favourite);
    }
}
