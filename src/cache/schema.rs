//! Cache schema definitions and migrations.
//!
//! Every row in the cache can be re-derived from the remote listing except
//! the favourite flag, so older schemas are rebuilt rather than migrated.

use rusqlite::Connection;

use super::error::CacheError;

/// Current schema version. Increment when making schema changes.
pub const SCHEMA_VERSION: i32 = 2;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS category (
    id TEXT NOT NULL PRIMARY KEY,
    name TEXT NOT NULL,
    background TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS picture (
    id TEXT NOT NULL PRIMARY KEY,
    cid TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    is_favourite INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_picture_cid ON picture(cid);
CREATE INDEX IF NOT EXISTS idx_picture_is_favourite ON picture(is_favourite);
"#;

const DROP_ALL: &str = r#"
DROP TABLE IF EXISTS category;
DROP TABLE IF EXISTS picture;
"#;

/// Get the current schema version from the database.
pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32, CacheError> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), CacheError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

/// Initialize or rebuild the cache schema.
///
/// Idempotent on an up-to-date database. A database written by an older
/// schema is dropped and recreated empty.
pub(crate) fn migrate(conn: &Connection) -> Result<(), CacheError> {
    let current_version = get_schema_version(conn)?;

    if current_version > SCHEMA_VERSION {
        return Err(CacheError::UnsupportedSchemaVersion {
            found: current_version,
            expected: SCHEMA_VERSION,
        });
    }

    if current_version == SCHEMA_VERSION {
        return Ok(());
    }

    if current_version != 0 {
        tracing::warn!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Cache schema is outdated, rebuilding"
        );
        conn.execute_batch(DROP_ALL)?;
    }

    conn.execute_batch(SCHEMA)?;
    set_schema_version(conn, SCHEMA_VERSION)?;
    tracing::debug!("Initialized cache schema at version {}", SCHEMA_VERSION);
    Ok(())
}
