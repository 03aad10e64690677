//! Statistics generation from crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::state::PageState;
use crate::storage::Storage;
use crate::CrawlError;
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Total number of URLs in the frontier
    pub total_urls: u64,

    /// URLs resolved to a terminal state
    pub loaded_urls: u64,

    /// URLs discovered but not yet fetched
    pub pending_urls: u64,

    /// Count of PageMeta rows by state
    pub pages_by_state: HashMap<PageState, u64>,

    /// Number of stored bodies
    pub content_rows: u64,

    /// Error summary (error states and their counts)
    pub error_summary: HashMap<PageState, u64>,
}

impl CrawlStatistics {
    /// Total number of PageMeta rows
    pub fn total_pages(&self) -> u64 {
        self.pages_by_state.values().sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(CrawlError)` - Failed to query statistics
pub fn load_statistics<S: Storage>(storage: &S) -> Result<CrawlStatistics, CrawlError> {
    let total_urls = storage.count_urls(None)?;
    let loaded_urls = storage.count_urls(Some(true))?;
    let pending_urls = storage.count_urls(Some(false))?;
    let content_rows = storage.count_content()?;

    let mut pages_by_state = HashMap::new();
    let mut error_summary = HashMap::new();

    for state in PageState::all_states() {
        let count = storage.count_meta_by_state(state)?;
        if count == 0 {
            continue;
        }
        pages_by_state.insert(state, count);
        if state.is_error() {
            error_summary.insert(state, count);
        }
    }

    Ok(CrawlStatistics {
        total_urls,
        loaded_urls,
        pending_urls,
        pages_by_state,
        content_rows,
        error_summary,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Frontier:");
    println!("  Total URLs: {}", stats.total_urls);
    println!("  Loaded: {}", stats.loaded_urls);
    println!("  Pending: {}", stats.pending_urls);
    println!("  Stored bodies: {}", stats.content_rows);
    println!();

    let total_pages = stats.total_pages();

    println!("Pages by State:");
    // Sort states by count (descending)
    let mut state_counts: Vec<_> = stats.pages_by_state.iter().collect();
    state_counts.sort_by(|a, b| b.1.cmp(a.1));

    for (state, count) in state_counts {
        let percentage = if total_pages > 0 {
            (*count as f64 / total_pages as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", state, count, percentage);
    }
    println!();

    if !stats.error_summary.is_empty() {
        println!("Error Summary:");
        let mut error_counts: Vec<_> = stats.error_summary.iter().collect();
        error_counts.sort_by(|a, b| b.1.cmp(a.1));

        for (state, count) in error_counts {
            println!("  {}: {}", state, count);
        }
        println!();
    }

    let succeeded = stats
        .pages_by_state
        .get(&PageState::Success)
        .copied()
        .unwrap_or(0);
    let success_rate = if total_pages > 0 {
        (succeeded as f64 / total_pages as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} pages stored)",
        success_rate, succeeded, total_pages
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ContentRecord, PageMeta, SqliteStorage, StorageTx, UrlRecord};

    #[test]
    fn test_empty_store() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let stats = load_statistics(&storage).unwrap();
        assert_eq!(stats.total_urls, 0);
        assert_eq!(stats.total_pages(), 0);
        assert!(stats.pages_by_state.is_empty());
    }

    #[test]
    fn test_counts_by_state() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let mut tx = storage.transaction().unwrap();
        for (i, state) in [PageState::Success, PageState::ErrorStatusCode]
            .into_iter()
            .enumerate()
        {
            let url = format!("https://example.com/{}", i);
            tx.insert_url(&UrlRecord::discovered(&url, None, None))
                .unwrap();
            let id = tx.next_page_id().unwrap();
            tx.put_meta(&PageMeta {
                id,
                url_id: url.clone(),
                state,
                status_code: Some(if state.is_success() { 200 } else { 500 }),
                origin: None,
                redirect_depth: 0,
                referer_id: None,
            })
            .unwrap();
            if state.is_success() {
                tx.put_content(&ContentRecord {
                    page_id: id,
                    hash: "h".to_string(),
                    body: Vec::new(),
                    title: String::new(),
                })
                .unwrap();
            }
            tx.mark_loaded(&url, None).unwrap();
        }
        tx.insert_url(&UrlRecord::discovered("https://example.com/later", None, None))
            .unwrap();
        tx.commit().unwrap();

        let stats = load_statistics(&storage).unwrap();
        assert_eq!(stats.total_urls, 3);
        assert_eq!(stats.loaded_urls, 2);
        assert_eq!(stats.pending_urls, 1);
        assert_eq!(stats.content_rows, 1);
        assert_eq!(stats.total_pages(), 2);
        assert_eq!(stats.error_summary.get(&PageState::ErrorStatusCode), Some(&1));
        assert!(!stats.error_summary.contains_key(&PageState::Success));
    }
}
