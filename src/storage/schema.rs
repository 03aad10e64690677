//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the crawl database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Configured hosts with their robots.txt snapshot
CREATE TABLE IF NOT EXISTS hosts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    robots_status_code INTEGER NOT NULL,
    robots_data BLOB NOT NULL,
    fetched_at TEXT NOT NULL
);

-- Frontier: every discovered URL, keyed by its normalized form
CREATE TABLE IF NOT EXISTS urls (
    id TEXT PRIMARY KEY,
    parent_page_id INTEGER,
    host_id INTEGER REFERENCES hosts(id),
    loaded INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_urls_host_loaded ON urls(host_id, loaded);

-- One resolution record per loaded URL
CREATE TABLE IF NOT EXISTS meta (
    id INTEGER PRIMARY KEY,
    url_id TEXT NOT NULL UNIQUE REFERENCES urls(id),
    state TEXT NOT NULL,
    status_code INTEGER,
    origin INTEGER REFERENCES meta(id),
    redirect_depth INTEGER NOT NULL DEFAULT 0,
    referer_id INTEGER REFERENCES meta(id)
);

CREATE INDEX IF NOT EXISTS idx_meta_state ON meta(state);

-- Bodies of successful pages; a hash is owned by exactly one page
CREATE TABLE IF NOT EXISTS content (
    page_id INTEGER PRIMARY KEY REFERENCES meta(id),
    hash TEXT NOT NULL UNIQUE,
    body BLOB NOT NULL,
    title TEXT NOT NULL DEFAULT ''
);

-- Monotonic id counters
CREATE TABLE IF NOT EXISTS counters (
    name TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);

INSERT OR IGNORE INTO counters (name, value) VALUES ('page_id', 0);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
