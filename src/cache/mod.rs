//! Local cache of the remote gallery.
//!
//! SQLite-backed store holding the `category` and `picture` tables. Only the
//! favourite flag on pictures is local state; everything else is rebuilt
//! from the remote listing on refresh.

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{CacheStore, CacheTable, SqliteCacheStore};
pub use error::CacheError;
pub use types::{Category, PictureRecord};
