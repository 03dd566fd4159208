//! Cache store trait and SQLite implementation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::watch;

use super::error::CacheError;
use super::schema;
use super::types::{CacheSummary, Category, PictureRecord};

/// Tables whose committed changes can be observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTable {
    Category,
    Picture,
}

/// Trait for cache store operations.
///
/// This trait is object-safe and can be used with `Arc<dyn CacheStore>` for
/// shared access across async tasks. Every mutating call commits atomically
/// and bumps the change counter of the table it touched.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// All cached categories.
    async fn categories(&self) -> Result<Vec<Category>, CacheError>;

    /// Clear the category table and insert `categories`, in one transaction.
    async fn replace_categories(&self, categories: &[Category]) -> Result<(), CacheError>;

    /// Pictures cached for one category.
    async fn pictures(&self, category_id: &str) -> Result<Vec<PictureRecord>, CacheError>;

    /// Favourited pictures across every category.
    async fn favourites(&self) -> Result<Vec<PictureRecord>, CacheError>;

    /// Ids of every favourited picture across every category.
    async fn favourite_ids(&self) -> Result<HashSet<String>, CacheError>;

    /// A single picture by id. Fails with [`CacheError::NotFound`] if absent.
    async fn picture(&self, id: &str) -> Result<PictureRecord, CacheError>;

    /// Delete this category's picture rows and insert `pictures`, in one
    /// transaction. Rows of other categories are untouched.
    async fn replace_pictures(
        &self,
        category_id: &str,
        pictures: &[PictureRecord],
    ) -> Result<(), CacheError>;

    /// Update an existing picture row in place.
    ///
    /// Fails with [`CacheError::NotFound`] if no row has `picture.id`.
    async fn update_picture(&self, picture: &PictureRecord) -> Result<(), CacheError>;

    /// Row counts and schema version.
    async fn summary(&self) -> Result<CacheSummary, CacheError>;

    /// Subscribe to the change counter of `table`.
    ///
    /// The counter is bumped after every committed mutation of the table.
    fn subscribe(&self, table: CacheTable) -> watch::Receiver<u64>;
}

/// Change counters, one per observable table.
#[derive(Debug)]
struct ChangeFeed {
    categories: watch::Sender<u64>,
    pictures: watch::Sender<u64>,
}

impl ChangeFeed {
    fn new() -> Self {
        Self {
            categories: watch::channel(0).0,
            pictures: watch::channel(0).0,
        }
    }

    fn sender(&self, table: CacheTable) -> &watch::Sender<u64> {
        match table {
            CacheTable::Category => &self.categories,
            CacheTable::Picture => &self.pictures,
        }
    }

    fn notify(&self, table: CacheTable) {
        self.sender(table).send_modify(|v| *v = v.wrapping_add(1));
    }
}

/// SQLite implementation of the cache store.
pub struct SqliteCacheStore {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync.
    /// The lock also makes every clear+insert sequence single-writer.
    conn: Mutex<Connection>,
    /// Path to the database file (for error messages).
    path: PathBuf,
    changes: ChangeFeed,
}

impl std::fmt::Debug for SqliteCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCacheStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteCacheStore {
    /// Open or create a cache database at the given path.
    pub async fn open(path: &Path) -> Result<Self, CacheError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path_clone.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| CacheError::CreateDir {
                        path: parent.to_path_buf(),
                        source: e,
                    })?;
                }
            }

            let conn = Connection::open(&path_clone).map_err(|e| CacheError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            // WAL lets readers observe committed state while a refresh writes
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(CacheError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(CacheError::Migration)?;

            schema::migrate(&conn)?;

            Ok::<_, CacheError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
            changes: ChangeFeed::new(),
        })
    }

    /// Open an in-memory database (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory().map_err(|e| CacheError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
            changes: ChangeFeed::new(),
        })
    }

    /// Get the path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|e| CacheError::Query(e.to_string()))
    }
}

/// Run `body` inside BEGIN/COMMIT, rolling back on error.
fn in_transaction<F>(conn: &Connection, body: F) -> Result<(), CacheError>
where
    F: FnOnce(&Connection) -> Result<(), CacheError>,
{
    conn.execute("BEGIN TRANSACTION", [])
        .map_err(CacheError::query)?;

    match body(conn) {
        Ok(()) => {
            conn.execute("COMMIT", []).map_err(CacheError::query)?;
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute("ROLLBACK", []);
            Err(e)
        }
    }
}

fn row_to_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        background_id: row.get(2)?,
    })
}

fn row_to_picture(row: &rusqlite::Row<'_>) -> rusqlite::Result<PictureRecord> {
    Ok(PictureRecord {
        id: row.get(0)?,
        category_id: row.get(1)?,
        name: row.get(2)?,
        is_favourite: row.get(3)?,
    })
}

fn query_pictures(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<PictureRecord>, CacheError> {
    let mut stmt = conn.prepare_cached(sql).map_err(CacheError::query)?;
    let pictures = stmt
        .query_map(params, row_to_picture)
        .map_err(CacheError::query)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(CacheError::query)?;
    Ok(pictures)
}

fn count(conn: &Connection, sql: &str) -> Result<u64, CacheError> {
    let n: i64 = conn
        .query_row(sql, [], |row| row.get(0))
        .map_err(CacheError::query)?;
    Ok(n as u64)
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn categories(&self) -> Result<Vec<Category>, CacheError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare_cached("SELECT id, name, background FROM category ORDER BY rowid")
            .map_err(CacheError::query)?;

        let categories = stmt
            .query_map([], row_to_category)
            .map_err(CacheError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(CacheError::query)?;

        Ok(categories)
    }

    async fn replace_categories(&self, categories: &[Category]) -> Result<(), CacheError> {
        {
            let conn = self.lock()?;
            in_transaction(&conn, |conn| {
                conn.execute("DELETE FROM category", [])
                    .map_err(CacheError::query)?;

                let mut stmt = conn
                    .prepare_cached(
                        "INSERT OR REPLACE INTO category (id, name, background) VALUES (?1, ?2, ?3)",
                    )
                    .map_err(CacheError::query)?;

                for category in categories {
                    stmt.execute(rusqlite::params![
                        category.id,
                        category.name,
                        category.background_id,
                    ])
                    .map_err(CacheError::query)?;
                }
                Ok(())
            })?;
        }

        self.changes.notify(CacheTable::Category);
        Ok(())
    }

    async fn pictures(&self, category_id: &str) -> Result<Vec<PictureRecord>, CacheError> {
        let conn = self.lock()?;
        query_pictures(
            &conn,
            "SELECT id, cid, name, is_favourite FROM picture WHERE cid = ?1 ORDER BY rowid",
            [category_id],
        )
    }

    async fn favourites(&self) -> Result<Vec<PictureRecord>, CacheError> {
        let conn = self.lock()?;
        query_pictures(
            &conn,
            "SELECT id, cid, name, is_favourite FROM picture WHERE is_favourite ORDER BY rowid",
            [],
        )
    }

    async fn favourite_ids(&self) -> Result<HashSet<String>, CacheError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare_cached("SELECT id FROM picture WHERE is_favourite")
            .map_err(CacheError::query)?;

        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(CacheError::query)?
            .collect::<Result<HashSet<_>, _>>()
            .map_err(CacheError::query)?;

        Ok(ids)
    }

    async fn picture(&self, id: &str) -> Result<PictureRecord, CacheError> {
        let conn = self.lock()?;

        conn.query_row(
            "SELECT id, cid, name, is_favourite FROM picture WHERE id = ?1",
            [id],
            row_to_picture,
        )
        .optional()
        .map_err(CacheError::query)?
        .ok_or_else(|| CacheError::NotFound(id.to_string()))
    }

    async fn replace_pictures(
        &self,
        category_id: &str,
        pictures: &[PictureRecord],
    ) -> Result<(), CacheError> {
        {
            let conn = self.lock()?;
            in_transaction(&conn, |conn| {
                conn.execute("DELETE FROM picture WHERE cid = ?1", [category_id])
                    .map_err(CacheError::query)?;

                let mut stmt = conn
                    .prepare_cached(
                        "INSERT OR REPLACE INTO picture (id, cid, name, is_favourite) VALUES (?1, ?2, ?3, ?4)",
                    )
                    .map_err(CacheError::query)?;

                for picture in pictures {
                    stmt.execute(rusqlite::params![
                        picture.id,
                        picture.category_id,
                        picture.name,
                        picture.is_favourite,
                    ])
                    .map_err(CacheError::query)?;
                }
                Ok(())
            })?;
        }

        self.changes.notify(CacheTable::Picture);
        Ok(())
    }

    async fn update_picture(&self, picture: &PictureRecord) -> Result<(), CacheError> {
        let rows = {
            let conn = self.lock()?;
            conn.execute(
                "UPDATE picture SET cid = ?1, name = ?2, is_favourite = ?3 WHERE id = ?4",
                rusqlite::params![
                    picture.category_id,
                    picture.name,
                    picture.is_favourite,
                    picture.id,
                ],
            )
            .map_err(CacheError::query)?
        };

        if rows == 0 {
            return Err(CacheError::NotFound(picture.id.clone()));
        }

        self.changes.notify(CacheTable::Picture);
        Ok(())
    }

    async fn summary(&self) -> Result<CacheSummary, CacheError> {
        let conn = self.lock()?;

        Ok(CacheSummary {
            categories: count(&conn, "SELECT COUNT(*) FROM category")?,
            pictures: count(&conn, "SELECT COUNT(*) FROM picture")?,
            favourites: count(&conn, "SELECT COUNT(*) FROM picture WHERE is_favourite")?,
            schema_version: schema::get_schema_version(&conn)?,
        })
    }

    fn subscribe(&self, table: CacheTable) -> watch::Receiver<u64> {
        self.changes.sender(table).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: &str, name: &str, background: &str) -> Category {
        Category {
            id: id.to_string(),
            name: name.to_string(),
            background_id: background.to_string(),
        }
    }

    fn picture(id: &str, cid: &str, favourite: bool) -> PictureRecord {
        PictureRecord {
            id: id.to_string(),
            category_id: cid.to_string(),
            name: String::new(),
            is_favourite: favourite,
        }
    }

    #[tokio::test]
    async fn test_open_creates_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");
        let store = SqliteCacheStore::open(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), path);
    }

    #[tokio::test]
    async fn test_reopen_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let store = SqliteCacheStore::open(&path).await.unwrap();
            store
                .replace_categories(&[category("F1", "Cars", "G1")])
                .await
                .unwrap();
        }
        let store = SqliteCacheStore::open(&path).await.unwrap();
        assert_eq!(
            store.categories().await.unwrap(),
            vec![category("F1", "Cars", "G1")]
        );
    }

    #[tokio::test]
    async fn test_replace_categories_drops_old_rows() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        store
            .replace_categories(&[category("F1", "Cars", "G1"), category("F2", "Sea", "")])
            .await
            .unwrap();
        store
            .replace_categories(&[category("F3", "Sky", "G3")])
            .await
            .unwrap();

        assert_eq!(
            store.categories().await.unwrap(),
            vec![category("F3", "Sky", "G3")]
        );
    }

    #[tokio::test]
    async fn test_replace_categories_duplicate_ids_last_wins() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        store
            .replace_categories(&[category("", "Cars", "G1"), category("", "Sea", "G2")])
            .await
            .unwrap();

        let categories = store.categories().await.unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].name, "Sea");
    }

    #[tokio::test]
    async fn test_replace_pictures_scoped_to_category() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        store
            .replace_pictures("F1", &[picture("P1", "F1", false)])
            .await
            .unwrap();
        store
            .replace_pictures("F2", &[picture("P2", "F2", true)])
            .await
            .unwrap();
        store
            .replace_pictures("F1", &[picture("P3", "F1", false)])
            .await
            .unwrap();

        assert_eq!(
            store.pictures("F1").await.unwrap(),
            vec![picture("P3", "F1", false)]
        );
        assert_eq!(
            store.pictures("F2").await.unwrap(),
            vec![picture("P2", "F2", true)]
        );
    }

    #[tokio::test]
    async fn test_favourites_span_categories() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        store
            .replace_pictures("F1", &[picture("P1", "F1", true), picture("P2", "F1", false)])
            .await
            .unwrap();
        store
            .replace_pictures("F2", &[picture("P3", "F2", true)])
            .await
            .unwrap();

        let ids = store.favourite_ids().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("P1"));
        assert!(ids.contains("P3"));

        let favourites = store.favourites().await.unwrap();
        assert_eq!(favourites.len(), 2);
        assert!(favourites.iter().all(|p| p.is_favourite));
    }

    #[tokio::test]
    async fn test_picture_not_found() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        let result = store.picture("missing").await;
        assert!(matches!(result, Err(CacheError::NotFound(id)) if id == "missing"));
    }

    #[tokio::test]
    async fn test_update_picture_in_place() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        store
            .replace_pictures("F1", &[picture("P1", "F1", false), picture("P2", "F1", false)])
            .await
            .unwrap();

        store
            .update_picture(&picture("P1", "F1", true))
            .await
            .unwrap();

        assert!(store.picture("P1").await.unwrap().is_favourite);
        assert!(!store.picture("P2").await.unwrap().is_favourite);
        assert_eq!(store.pictures("F1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_missing_picture_is_not_an_insert() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        let result = store.update_picture(&picture("P1", "F1", true)).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
        assert_eq!(store.summary().await.unwrap().pictures, 0);
    }

    #[tokio::test]
    async fn test_summary_counts() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        store
            .replace_categories(&[category("F1", "Cars", "G1")])
            .await
            .unwrap();
        store
            .replace_pictures("F1", &[picture("P1", "F1", true), picture("P2", "F1", false)])
            .await
            .unwrap();

        let summary = store.summary().await.unwrap();
        assert_eq!(
            summary,
            CacheSummary {
                categories: 1,
                pictures: 2,
                favourites: 1,
                schema_version: schema::SCHEMA_VERSION,
            }
        );
    }

    #[tokio::test]
    async fn test_mutations_bump_only_their_table() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        let mut categories = store.subscribe(CacheTable::Category);
        let mut pictures = store.subscribe(CacheTable::Picture);

        store
            .replace_pictures("F1", &[picture("P1", "F1", false)])
            .await
            .unwrap();

        assert!(pictures.has_changed().unwrap());
        assert!(!categories.has_changed().unwrap());
        pictures.borrow_and_update();

        store
            .replace_categories(&[category("F1", "Cars", "")])
            .await
            .unwrap();
        assert!(categories.has_changed().unwrap());
        assert!(!pictures.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_failed_update_does_not_notify() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        let pictures = store.subscribe(CacheTable::Picture);
        let _ = store.update_picture(&picture("P1", "F1", true)).await;
        assert!(!pictures.has_changed().unwrap());
    }
}
