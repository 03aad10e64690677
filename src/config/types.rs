use serde::Deserialize;

/// Main configuration structure for a crawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    #[serde(rename = "host", default)]
    pub hosts: Vec<HostEntry>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Total number of pages fetched across all hosts; <= 0 disables the crawl
    #[serde(rename = "page-budget")]
    pub page_budget: i64,

    /// Fixed pause after every request that got a response (milliseconds)
    #[serde(rename = "politeness-delay")]
    pub politeness_delay: u64,

    /// Redirect counter value at which a chain is abandoned
    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Results applied per write transaction
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Capacity of each per-host task channel
    #[serde(rename = "task-queue-capacity", default = "default_task_queue_capacity")]
    pub task_queue_capacity: usize,

    /// Capacity of the shared results channel
    #[serde(rename = "result-queue-capacity", default = "default_result_queue_capacity")]
    pub result_queue_capacity: usize,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,
}

fn default_max_redirects() -> u32 {
    10
}

fn default_batch_size() -> usize {
    100
}

fn default_task_queue_capacity() -> usize {
    16
}

fn default_result_queue_capacity() -> usize {
    256
}

fn default_request_timeout() -> u64 {
    30
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler, also its robots.txt user-agent token
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Builds the `User-Agent` header value
    ///
    /// Format: `Name/Version (+contact-url; contact-email)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// A configured crawl host
#[derive(Debug, Clone, Deserialize)]
pub struct HostEntry {
    /// Root URL of the host (e.g., "https://example.com/")
    pub root: String,
}
