//! Crawler coordinator - crawl startup and shutdown
//!
//! This module wires the crawl together:
//! - Opening the store and initializing every configured host (robots.txt)
//! - Selecting each host's starting URLs from the frontier, or its root URL
//! - Spawning one worker per host and the single write worker
//! - Waiting for all of them to finish

use crate::config::Config;
use crate::crawler::dedup::DedupIndex;
use crate::crawler::extractor::{Extractor, HtmlExtractor};
use crate::crawler::fetcher::{build_http_client, PageFetcher};
use crate::crawler::scheduler::{per_host_quota, HostScheduler};
use crate::crawler::worker::HostWorker;
use crate::crawler::writer::{CrawlReport, WriteWorker};
use crate::robots::{resolve_host, RobotsPolicy};
use crate::storage::{open_storage, HostRecord, SqliteStorage, Storage, StorageTx, UrlRecord};
use crate::url::{host_root, normalize_url};
use crate::{CrawlError, UrlError};
use reqwest::Client;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use url::Url;

/// A host that passed initialization
struct ActiveHost {
    record: HostRecord,
    robots: RobotsPolicy,
    backlog: Vec<String>,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Config,
    storage: SqliteStorage,
    client: Client,
    extractor: Arc<dyn Extractor>,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// Opening the store is the only failure here that is fatal.
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `extractor` - Extraction transform applied to fetched bodies
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlError)` - Failed to open the store or build the HTTP client
    pub fn new(config: Config, extractor: Arc<dyn Extractor>) -> Result<Self, CrawlError> {
        let storage = open_storage(Path::new(&config.storage.database_path))?;
        let client = build_http_client(&config)?;

        Ok(Self {
            config,
            storage,
            client,
            extractor,
        })
    }

    /// Runs the crawl to completion
    pub async fn run(mut self) -> Result<CrawlReport, CrawlError> {
        let budget = self.config.crawler.page_budget;
        if budget <= 0 {
            tracing::info!("Page budget is {}, nothing to crawl", budget);
            return Ok(CrawlReport::default());
        }

        let start_time = Instant::now();
        let mut hosts = self.init_hosts().await;
        if hosts.is_empty() {
            tracing::warn!("No host could be initialized, nothing to crawl");
            return Ok(CrawlReport::default());
        }

        let quota = per_host_quota(budget, hosts.len());
        self.select_start_urls(&mut hosts, quota)?;
        tracing::info!(
            "Crawling {} hosts with budget {} ({} pages per host)",
            hosts.len(),
            budget,
            quota
        );

        let crawler = &self.config.crawler;
        let (result_tx, result_rx) = mpsc::channel(crawler.result_queue_capacity);
        let fetcher = Arc::new(
            PageFetcher::new(
                self.client.clone(),
                Arc::clone(&self.extractor),
                crawler.max_redirects,
            )
            .with_crawl_hosts(hosts.iter().map(|host| host.record.name.clone())),
        );
        let delay = Duration::from_millis(crawler.politeness_delay);

        let mut scheduler = HostScheduler::new(budget);
        let mut host_ids = HashMap::new();
        let mut workers = Vec::with_capacity(hosts.len());

        for host in hosts {
            let (task_tx, task_rx) = mpsc::channel(crawler.task_queue_capacity);
            scheduler.add_host(host.record.id, host.record.name.clone(), task_tx, quota, host.backlog);
            host_ids.insert(host.record.name.clone(), host.record.id);

            let worker = HostWorker {
                host_id: host.record.id,
                name: host.record.name,
                robots: host.robots,
                fetcher: Arc::clone(&fetcher),
                delay,
            };
            workers.push(tokio::spawn(worker.run(task_rx, result_tx.clone())));
        }
        drop(result_tx);

        let dedup = DedupIndex::new(self.storage.load_dedup_index()?);
        tracing::info!("Dedup index loaded with {} hashes", dedup.len());

        scheduler.start();

        let writer = WriteWorker::new(self.storage, scheduler, dedup, host_ids, crawler.batch_size);
        let writer_handle = tokio::task::spawn_blocking(move || writer.run(result_rx));

        let mut fetched = 0;
        for worker in workers {
            match worker.await {
                Ok(count) => fetched += count,
                Err(e) => tracing::error!("Host worker failed: {}", e),
            }
        }

        let (report, _storage) = writer_handle.await?;

        tracing::info!(
            "Crawl completed: {} pages fetched, {} written in {:?}",
            fetched,
            report.pages_written,
            start_time.elapsed()
        );

        Ok(report)
    }

    /// Resolves the Host record and robots policy of every configured host
    ///
    /// Hosts that fail are logged and left out.
    async fn init_hosts(&mut self) -> Vec<ActiveHost> {
        let mut active = Vec::new();
        let agent = self.config.user_agent.crawler_name.clone();

        for entry in &self.config.hosts {
            let root = match Url::parse(&entry.root) {
                Ok(root) => root,
                Err(e) => {
                    tracing::warn!("Skipping host {}: {}", entry.root, e);
                    continue;
                }
            };

            match resolve_host(&mut self.storage, &self.client, &root, &agent).await {
                Ok((record, robots)) => active.push(ActiveHost {
                    record,
                    robots,
                    backlog: Vec::new(),
                }),
                Err(e) => tracing::warn!("Skipping host {}: {}", entry.root, e),
            }
        }

        active
    }

    /// Fills each host's backlog with up to `quota` pending frontier URLs
    ///
    /// A host without pending URLs gets its root URL, unless the root was
    /// already crawled in an earlier run.
    fn select_start_urls(&mut self, hosts: &mut [ActiveHost], quota: i64) -> Result<(), CrawlError> {
        let limit = usize::try_from(quota).unwrap_or(usize::MAX);
        let mut needs_root = Vec::new();

        for (index, host) in hosts.iter_mut().enumerate() {
            host.backlog = self.storage.pending_urls(host.record.id, limit)?;
            if host.backlog.is_empty() {
                needs_root.push(index);
            } else {
                tracing::info!(
                    "Resuming {} with {} pending URLs",
                    host.record.name,
                    host.backlog.len()
                );
            }
        }

        if needs_root.is_empty() {
            return Ok(());
        }

        let mut tx = self.storage.transaction()?;
        for index in needs_root {
            let host = &mut hosts[index];
            let root = seed_url(&host.record.name, &self.config)?;
            if tx.insert_url(&UrlRecord::discovered(&root, Some(host.record.id), None))? {
                tracing::info!("Seeding {} with {}", host.record.name, root);
                host.backlog.push(root);
            } else {
                tracing::info!("{} has no pending URLs left", host.record.name);
            }
        }
        tx.commit()?;

        Ok(())
    }
}

/// Builds the normalized root URL of a configured host
fn seed_url(host_name: &str, config: &Config) -> Result<String, CrawlError> {
    for entry in &config.hosts {
        let Ok(url) = Url::parse(&entry.root) else {
            continue;
        };
        if crate::url::host_key(&url).as_deref() == Some(host_name) {
            let root = host_root(&url).ok_or(UrlError::MissingHost)?;
            return Ok(normalize_url(&root)?);
        }
    }

    Err(UrlError::Malformed(format!("no configured root for host {}", host_name)).into())
}

/// Runs the main crawl operation with the default HTML extractor
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Crawl completed; per-page failures are in the store
/// * `Err(CrawlError)` - The store could not be opened or startup failed
///
/// # Example
///
/// ```no_run
/// use hostcrawl::config::load_config;
/// use hostcrawl::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("config.toml"))?;
/// let report = run_crawl(config).await?;
/// println!("{} pages written", report.pages_written);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config) -> Result<CrawlReport, CrawlError> {
    run_crawl_with_extractor(config, Arc::new(HtmlExtractor)).await
}

/// Runs a crawl with a custom extraction transform
pub async fn run_crawl_with_extractor(
    config: Config,
    extractor: Arc<dyn Extractor>,
) -> Result<CrawlReport, CrawlError> {
    Coordinator::new(config, extractor)?.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CrawlerConfig, HostEntry, StorageConfig, UserAgentConfig};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(db: &Path, budget: i64, roots: &[String]) -> Config {
        Config {
            crawler: CrawlerConfig {
                page_budget: budget,
                politeness_delay: 0,
                max_redirects: 10,
                batch_size: 100,
                task_queue_capacity: 4,
                result_queue_capacity: 16,
                request_timeout: 5,
            },
            user_agent: UserAgentConfig {
                crawler_name: "TestCrawler".to_string(),
                crawler_version: "1.0".to_string(),
                contact_url: "https://example.com/about".to_string(),
                contact_email: "admin@example.com".to_string(),
            },
            storage: StorageConfig {
                database_path: db.to_string_lossy().into_owned(),
            },
            hosts: roots
                .iter()
                .map(|root| HostEntry { root: root.clone() })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_zero_budget_does_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = create_test_config(&dir.path().join("crawl.db"), 0, &[server.uri()]);
        let report = run_crawl(config).await.unwrap();
        assert_eq!(report, CrawlReport::default());
    }

    #[tokio::test]
    async fn test_unavailable_robots_skips_host() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = create_test_config(&dir.path().join("crawl.db"), 5, &[server.uri()]);
        let report = run_crawl(config).await.unwrap();
        assert_eq!(report.results_received, 0);
    }

    #[test]
    fn test_seed_url_is_normalized_root() {
        let dir = TempDir::new().unwrap();
        let config = create_test_config(
            &dir.path().join("crawl.db"),
            5,
            &["HTTP://Example.COM:8080/start/page".to_string()],
        );
        assert_eq!(
            seed_url("example.com:8080", &config).unwrap(),
            "http://example.com:8080/"
        );
        assert!(seed_url("other.org", &config).is_err());
    }

    #[test]
    fn test_unopenable_store_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = create_test_config(&dir.path().join("missing/dir/crawl.db"), 5, &[]);
        assert!(matches!(
            Coordinator::new(config, Arc::new(HtmlExtractor)),
            Err(CrawlError::Database(_))
        ));
    }
}
