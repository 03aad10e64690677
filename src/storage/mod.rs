//! Storage module for persisting crawl state
//!
//! This module handles all durable crawl state:
//! - Host records with their robots.txt snapshot
//! - The URL frontier (discovered URLs and their `loaded` flag)
//! - PageMeta records, one per resolved URL
//! - Content rows (compressed body, hash, title) for successful pages
//! - The monotonic page-id counter
//!
//! All mutation after startup goes through a [`StorageTx`] owned by the
//! write worker.

mod compress;
mod schema;
mod sqlite;
mod traits;

pub use compress::{compress_body, decompress_body};
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult, StorageTx};

use crate::state::PageState;
use crate::CrawlError;

use std::path::Path;

/// Opens (creating if needed) the crawl database
///
/// This is the only storage failure that is fatal to the process.
pub fn open_storage(path: &Path) -> Result<SqliteStorage, CrawlError> {
    SqliteStorage::new(path)
}

/// Opens a crawl database that must already exist
///
/// Used by read-only views such as `--stats`, which must not leave an
/// empty database behind when pointed at a wrong path.
pub fn open_existing_storage(path: &Path) -> Result<SqliteStorage, CrawlError> {
    if !path.is_file() {
        return Err(StorageError::Missing(path.display().to_string()).into());
    }
    SqliteStorage::new(path)
}

/// A configured host and its persisted robots.txt snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRecord {
    pub id: i64,
    pub name: String,
    pub robots_status_code: u16,
    pub robots_data: Vec<u8>,
    pub fetched_at: String,
}

/// Frontier entry, keyed by normalized URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRecord {
    pub id: String,
    pub parent_page_id: Option<i64>,
    pub host_id: Option<i64>,
    pub loaded: bool,
}

impl UrlRecord {
    /// A freshly discovered, not yet loaded URL
    pub fn discovered(id: impl Into<String>, host_id: Option<i64>, parent: Option<i64>) -> Self {
        Self {
            id: id.into(),
            parent_page_id: parent,
            host_id,
            loaded: false,
        }
    }
}

/// Resolution record of one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMeta {
    pub id: i64,
    pub url_id: String,
    pub state: PageState,
    pub status_code: Option<u16>,
    pub origin: Option<i64>,
    pub redirect_depth: u32,
    pub referer_id: Option<i64>,
}

/// Stored body of a successful page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    pub page_id: i64,
    pub hash: String,
    pub body: Vec<u8>,
    pub title: String,
}
