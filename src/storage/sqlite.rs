//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.

use crate::state::PageState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult, StorageTx};
use crate::storage::{ContentRecord, HostRecord, PageMeta, UrlRecord};
use crate::CrawlError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::collections::HashMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(CrawlError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, CrawlError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for tests and dry runs)
    pub fn open_in_memory() -> Result<Self, CrawlError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// An open SQLite write transaction
pub struct SqliteTx<'a> {
    tx: Transaction<'a>,
}

const META_COLUMNS: &str = "id, url_id, state, status_code, origin, redirect_depth, referer_id";

fn host_from_row(row: &Row<'_>) -> rusqlite::Result<HostRecord> {
    Ok(HostRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        robots_status_code: row.get(2)?,
        robots_data: row.get(3)?,
        fetched_at: row.get(4)?,
    })
}

type RawMeta = (i64, String, String, Option<u16>, Option<i64>, u32, Option<i64>);

fn raw_meta_from_row(row: &Row<'_>) -> rusqlite::Result<RawMeta> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn meta_from_raw(raw: RawMeta) -> StorageResult<PageMeta> {
    let (id, url_id, state, status_code, origin, redirect_depth, referer_id) = raw;
    let state = PageState::from_db_string(&state)
        .ok_or_else(|| StorageError::Corrupt(format!("unknown page state '{}' on {}", state, id)))?;

    Ok(PageMeta {
        id,
        url_id,
        state,
        status_code,
        origin,
        redirect_depth,
        referer_id,
    })
}

impl Storage for SqliteStorage {
    type Tx<'a> = SqliteTx<'a> where Self: 'a;

    fn transaction(&mut self) -> StorageResult<SqliteTx<'_>> {
        let tx = self.conn.transaction()?;
        Ok(SqliteTx { tx })
    }

    // ===== Hosts =====

    fn get_host(&self, name: &str) -> StorageResult<Option<HostRecord>> {
        let host = self
            .conn
            .query_row(
                "SELECT id, name, robots_status_code, robots_data, fetched_at
                 FROM hosts WHERE name = ?1",
                params![name],
                host_from_row,
            )
            .optional()?;

        Ok(host)
    }

    fn insert_host(
        &mut self,
        name: &str,
        robots_status_code: u16,
        robots_data: &[u8],
    ) -> StorageResult<HostRecord> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO hosts (name, robots_status_code, robots_data, fetched_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, robots_status_code, robots_data, now],
        )?;

        Ok(HostRecord {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            robots_status_code,
            robots_data: robots_data.to_vec(),
            fetched_at: now,
        })
    }

    // ===== Frontier =====

    fn pending_urls(&self, host_id: i64, limit: usize) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM urls WHERE host_id = ?1 AND loaded = 0 ORDER BY rowid LIMIT ?2",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let urls = stmt
            .query_map(params![host_id, limit], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(urls)
    }

    fn get_url(&self, url: &str) -> StorageResult<Option<UrlRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, parent_page_id, host_id, loaded FROM urls WHERE id = ?1",
                params![url],
                |row| {
                    Ok(UrlRecord {
                        id: row.get(0)?,
                        parent_page_id: row.get(1)?,
                        host_id: row.get(2)?,
                        loaded: row.get::<_, i64>(3)? != 0,
                    })
                },
            )
            .optional()?;

        Ok(record)
    }

    // ===== Meta / Content =====

    fn get_meta_by_url(&self, url: &str) -> StorageResult<Option<PageMeta>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {} FROM meta WHERE url_id = ?1", META_COLUMNS),
                params![url],
                raw_meta_from_row,
            )
            .optional()?;

        raw.map(meta_from_raw).transpose()
    }

    fn get_content(&self, page_id: i64) -> StorageResult<Option<ContentRecord>> {
        let content = self
            .conn
            .query_row(
                "SELECT page_id, hash, body, title FROM content WHERE page_id = ?1",
                params![page_id],
                |row| {
                    Ok(ContentRecord {
                        page_id: row.get(0)?,
                        hash: row.get(1)?,
                        body: row.get(2)?,
                        title: row.get(3)?,
                    })
                },
            )
            .optional()?;

        Ok(content)
    }

    fn load_dedup_index(&self) -> StorageResult<HashMap<String, i64>> {
        let mut stmt = self.conn.prepare("SELECT hash, page_id FROM content")?;

        let index = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<HashMap<String, i64>, _>>()?;

        Ok(index)
    }

    // ===== Statistics =====

    fn count_urls(&self, loaded: Option<bool>) -> StorageResult<u64> {
        let count: i64 = match loaded {
            Some(loaded) => self.conn.query_row(
                "SELECT COUNT(*) FROM urls WHERE loaded = ?1",
                params![loaded as i64],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM urls", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }

    fn count_meta_by_state(&self, state: PageState) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM meta WHERE state = ?1",
            params![state.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_content(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM content", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl StorageTx for SqliteTx<'_> {
    fn insert_url(&mut self, record: &UrlRecord) -> StorageResult<bool> {
        let inserted = self.tx.execute(
            "INSERT OR IGNORE INTO urls (id, parent_page_id, host_id, loaded) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id,
                record.parent_page_id,
                record.host_id,
                record.loaded as i64
            ],
        )?;
        Ok(inserted > 0)
    }

    fn mark_loaded(&mut self, url: &str, parent_page_id: Option<i64>) -> StorageResult<()> {
        let updated = self.tx.execute(
            "UPDATE urls SET loaded = 1, parent_page_id = COALESCE(parent_page_id, ?2) WHERE id = ?1",
            params![url, parent_page_id],
        )?;

        if updated == 0 {
            return Err(StorageError::UrlNotFound(url.to_string()));
        }
        Ok(())
    }

    fn meta_id(&mut self, url: &str) -> StorageResult<Option<i64>> {
        let id = self
            .tx
            .query_row(
                "SELECT id FROM meta WHERE url_id = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn next_page_id(&mut self) -> StorageResult<i64> {
        self.tx.execute(
            "UPDATE counters SET value = value + 1 WHERE name = 'page_id'",
            [],
        )?;
        let id = self.tx.query_row(
            "SELECT value FROM counters WHERE name = 'page_id'",
            [],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn put_meta(&mut self, meta: &PageMeta) -> StorageResult<()> {
        self.tx.execute(
            "INSERT INTO meta (id, url_id, state, status_code, origin, redirect_depth, referer_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                status_code = excluded.status_code,
                origin = excluded.origin,
                redirect_depth = excluded.redirect_depth,
                referer_id = excluded.referer_id",
            params![
                meta.id,
                meta.url_id,
                meta.state.to_db_string(),
                meta.status_code,
                meta.origin,
                meta.redirect_depth,
                meta.referer_id
            ],
        )?;
        Ok(())
    }

    fn put_content(&mut self, content: &ContentRecord) -> StorageResult<()> {
        self.tx.execute(
            "INSERT INTO content (page_id, hash, body, title) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(page_id) DO UPDATE SET
                hash = excluded.hash,
                body = excluded.body,
                title = excluded.title",
            params![content.page_id, content.hash, content.body, content.title],
        )?;
        Ok(())
    }

    fn commit(self) -> StorageResult<()> {
        self.tx.commit()?;
        Ok(())
    }
}
