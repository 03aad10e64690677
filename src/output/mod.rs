//! Output module for crawl reports
//!
//! This module reads crawl statistics back from the store and prints them.

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
