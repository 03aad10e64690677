//! Crawler module for host-scoped page fetching and persistence
//!
//! This module contains the core crawling logic, including:
//! - The extraction transform (links, title, robots meta)
//! - Page fetching with manual redirect resolution
//! - One worker per host and the budget-driven host scheduler
//! - Content-hash deduplication
//! - The single write worker applying results in batched transactions
//! - Overall crawl coordination
//!
//! Data flows scheduler -> per-host task channels -> host workers ->
//! results channel -> write worker -> store. Closing a host's task channel
//! is the only way a worker is stopped.

mod coordinator;
mod dedup;
mod extractor;
mod fetcher;
mod scheduler;
mod worker;
mod writer;

pub use coordinator::{run_crawl, run_crawl_with_extractor, Coordinator};
pub use dedup::DedupIndex;
pub use extractor::{ExtractError, Extracted, Extractor, HtmlExtractor};
pub use fetcher::{
    build_http_client, is_supported_content_type, Fetched, FetchedContent, PageFetcher, PageResult,
    RedirectHop,
};
pub use scheduler::{per_host_quota, HostScheduler, Task};
pub use worker::HostWorker;
pub use writer::{CrawlReport, WriteWorker};
