//! Storage traits and error types
//!
//! This module defines the repository interface over the four logical crawl
//! entities (Host, URL, Meta, Content) plus the page-id counter. Any backend
//! that can provide serializable transactions can implement it.

use crate::state::PageState;
use crate::storage::{ContentRecord, HostRecord, PageMeta, UrlRecord};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database does not exist: {0}")]
    Missing(String),

    #[error("URL not found: {0}")]
    UrlNotFound(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Read side and bootstrap operations of a crawl store
///
/// Reads here are best-effort snapshots used at startup and for
/// statistics. Every state transition during a crawl goes through
/// [`Storage::transaction`].
pub trait Storage: Send {
    /// Transaction handle; dropping it without `commit` rolls it back
    type Tx<'a>: StorageTx
    where
        Self: 'a;

    /// Opens a write transaction
    fn transaction(&mut self) -> StorageResult<Self::Tx<'_>>;

    // ===== Hosts =====

    /// Gets a host record by name (host key)
    fn get_host(&self, name: &str) -> StorageResult<Option<HostRecord>>;

    /// Creates a host record with its robots.txt snapshot
    ///
    /// Only called during host initialization, before the write worker
    /// starts.
    fn insert_host(
        &mut self,
        name: &str,
        robots_status_code: u16,
        robots_data: &[u8],
    ) -> StorageResult<HostRecord>;

    // ===== Frontier =====

    /// Returns up to `limit` unloaded URLs belonging to a host, oldest first
    fn pending_urls(&self, host_id: i64, limit: usize) -> StorageResult<Vec<String>>;

    /// Gets a URL record by normalized URL
    fn get_url(&self, url: &str) -> StorageResult<Option<UrlRecord>>;

    // ===== Meta / Content =====

    /// Gets the PageMeta of a URL, if it has been resolved
    fn get_meta_by_url(&self, url: &str) -> StorageResult<Option<PageMeta>>;

    /// Gets a Content row by page id
    fn get_content(&self, page_id: i64) -> StorageResult<Option<ContentRecord>>;

    /// Loads the hash -> first page id map from persisted Content rows
    fn load_dedup_index(&self) -> StorageResult<HashMap<String, i64>>;

    // ===== Statistics =====

    /// Counts URL records, optionally filtered by the `loaded` flag
    fn count_urls(&self, loaded: Option<bool>) -> StorageResult<u64>;

    /// Counts PageMeta rows in a state
    fn count_meta_by_state(&self, state: PageState) -> StorageResult<u64>;

    /// Counts Content rows
    fn count_content(&self) -> StorageResult<u64>;
}

/// Transactional state transitions applied by the write worker
pub trait StorageTx {
    /// Inserts a URL record unless one already exists
    ///
    /// Returns true if the record was new. Re-inserting a known URL is a
    /// no-op, which makes concurrent discovery of the same URL harmless.
    fn insert_url(&mut self, record: &UrlRecord) -> StorageResult<bool>;

    /// Flips `loaded` to true, attaching `parent_page_id` if none is set
    fn mark_loaded(&mut self, url: &str, parent_page_id: Option<i64>) -> StorageResult<()>;

    /// Returns the PageMeta id of a URL that has already been resolved
    fn meta_id(&mut self, url: &str) -> StorageResult<Option<i64>>;

    /// Allocates the next sequential page id from the counter record
    fn next_page_id(&mut self) -> StorageResult<i64>;

    /// Writes a PageMeta (insert or replace by id)
    fn put_meta(&mut self, meta: &PageMeta) -> StorageResult<()>;

    /// Writes a Content row (insert or replace by page id)
    fn put_content(&mut self, content: &ContentRecord) -> StorageResult<()>;

    /// Makes every change of this transaction durable
    fn commit(self) -> StorageResult<()>
    where
        Self: Sized;
}
