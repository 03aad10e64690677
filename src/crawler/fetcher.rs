//! HTTP fetcher implementation
//!
//! This module resolves one task URL to a terminal page outcome:
//! - Building HTTP clients with proper user agent strings
//! - Robots checks before any request is made
//! - Manual redirect handling with a hop counter
//! - Status, content type and body classification
//! - Handing the body to the extraction transform and hashing it

use crate::config::Config;
use crate::crawler::extractor::{ExtractError, Extractor};
use crate::crawler::scheduler::Task;
use crate::robots::RobotsPolicy;
use crate::state::PageState;
use crate::storage::compress_body;
use crate::url::{host_key, normalize_parsed};
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::{redirect::Policy, Client, StatusCode};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

const ACCEPT_VALUE: &str = "text/html,application/xhtml+xml;q=0.9,*/*;q=0.1";

/// One intermediate URL of a redirect chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectHop {
    /// Normalized URL that answered with a redirect
    pub url: String,
    /// The 3xx status it answered with
    pub status_code: u16,
}

/// Body of a successful page, ready to be stored
#[derive(Debug, Clone)]
pub struct FetchedContent {
    /// SHA-256 hex of the uncompressed body
    pub hash: String,
    /// zlib-compressed body; empty input when the page is `noindex`
    pub body: Vec<u8>,
    pub title: String,
}

/// Outcome of resolving one task, sent from a host worker to the write worker
#[derive(Debug, Clone)]
pub struct PageResult {
    /// The task URL
    pub url: String,
    /// Host the task was scheduled for
    pub host_id: i64,
    /// Redirect hops in order; the first one is `url` itself
    pub hops: Vec<RedirectHop>,
    /// URL the terminal state belongs to (`url` when there were no hops)
    pub final_url: String,
    /// `Redirect` here means the chain left for another crawled host and
    /// `final_url` is still unresolved
    pub state: PageState,
    pub status_code: Option<u16>,
    /// Present only for `Success`
    pub content: Option<FetchedContent>,
    /// Outgoing links (normalized URL -> host key); empty unless links are followed
    pub links: HashMap<String, String>,
}

impl PageResult {
    fn terminal(task: &Task, hops: Vec<RedirectHop>, final_url: String, state: PageState, status_code: Option<u16>) -> Self {
        Self {
            url: task.url.clone(),
            host_id: task.host_id,
            hops,
            final_url,
            state,
            status_code,
            content: None,
            links: HashMap::new(),
        }
    }
}

/// Result of one fetch together with whether a server answered
///
/// The politeness delay applies only to fetches that reached a server.
#[derive(Debug)]
pub struct Fetched {
    pub result: PageResult,
    pub responded: bool,
}

/// Builds an HTTP client with proper configuration
///
/// Redirects are never followed by the client; [`PageFetcher`] walks them
/// itself so every hop can be recorded.
///
/// # Arguments
///
/// * `config` - The crawl configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.header_value())
        .timeout(Duration::from_secs(config.crawler.request_timeout))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none()) // Handle redirects manually
        .gzip(true)
        .brotli(true)
        .build()
}

/// Resolves task URLs to terminal page outcomes
pub struct PageFetcher {
    client: Client,
    extractor: Arc<dyn Extractor>,
    max_redirects: u32,
    /// Host keys of every host taking part in the crawl
    crawl_hosts: HashSet<String>,
}

impl PageFetcher {
    pub fn new(client: Client, extractor: Arc<dyn Extractor>, max_redirects: u32) -> Self {
        Self {
            client,
            extractor,
            max_redirects,
            crawl_hosts: HashSet::new(),
        }
    }

    /// Sets the hosts whose pages are crawled by their own workers
    ///
    /// A redirect onto one of them is handed over instead of being
    /// recorded as `External`.
    pub fn with_crawl_hosts(mut self, hosts: impl IntoIterator<Item = String>) -> Self {
        self.crawl_hosts = hosts.into_iter().collect();
        self
    }

    /// Fetches a task URL, following redirects on its own host
    ///
    /// # Request Flow
    ///
    /// 1. Robots check; disallowed URLs are never requested
    /// 2. GET the URL
    /// 3. On a 3xx with `Location`, count the hop and continue with the target
    ///    - the chain is abandoned once the counter reaches the limit
    ///    - a target on another crawled host ends the chain as `Redirect`,
    ///      leaving the target to that host's worker
    ///    - a target on any other host ends the chain as `External`
    ///    - a target disallowed by robots ends the chain as `DisabledByRobots`
    /// 4. Classify status, content type and body
    ///
    /// # Arguments
    ///
    /// * `task` - The task to resolve
    /// * `host` - Host key of the worker running the task
    /// * `robots` - Robots policy of that host
    pub async fn fetch(&self, task: &Task, host: &str, robots: &RobotsPolicy) -> Fetched {
        let mut current = match Url::parse(&task.url) {
            Ok(url) => url,
            Err(e) => {
                warn!("Unparsable task URL {}: {}", task.url, e);
                return Fetched {
                    result: PageResult::terminal(task, Vec::new(), task.url.clone(), PageState::ParseError, None),
                    responded: false,
                };
            }
        };

        if !robots.is_allowed(current.as_str()) {
            debug!("Disallowed by robots.txt: {}", task.url);
            return Fetched {
                result: PageResult::terminal(task, Vec::new(), task.url.clone(), PageState::DisabledByRobots, None),
                responded: false,
            };
        }

        let mut hops: Vec<RedirectHop> = Vec::new();
        let mut redirects = 0u32;
        let mut responded = false;

        loop {
            let current_id = current.to_string();
            let response = match self
                .client
                .get(current.clone())
                .header(ACCEPT, ACCEPT_VALUE)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!("Connect error for {} (host {}): {}", current_id, host, e);
                    let result = PageResult::terminal(task, hops, current_id, PageState::ConnectError, None);
                    return Fetched { result, responded };
                }
            };
            responded = true;

            let status = response.status();
            let location = if status.is_redirection() {
                response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            } else {
                None
            };

            if let Some(location) = location {
                redirects += 1;
                if redirects >= self.max_redirects {
                    warn!(
                        "Too many redirects from {} (host {}): limit {} reached at {}",
                        task.url, host, self.max_redirects, current_id
                    );
                    let result = PageResult::terminal(task, Vec::new(), task.url.clone(), PageState::ConnectError, None);
                    return Fetched { result, responded };
                }

                let target = match current.join(&location) {
                    Ok(target) => target,
                    Err(e) => {
                        error!("Bad redirect location {:?} from {}: {}", location, current_id, e);
                        let result = PageResult::terminal(task, hops, current_id, PageState::ErrorStatusCode, Some(status.as_u16()));
                        return Fetched { result, responded };
                    }
                };

                let target_host = host_key(&target);
                let target_id = match normalize_parsed(target.clone()) {
                    Ok(id) => id,
                    Err(e) => {
                        error!("Unusable redirect target {} from {}: {}", target, current_id, e);
                        let result = PageResult::terminal(task, hops, current_id, PageState::ErrorStatusCode, Some(status.as_u16()));
                        return Fetched { result, responded };
                    }
                };

                debug!("Redirect {} {} -> {}", status.as_u16(), current_id, target_id);
                hops.push(RedirectHop {
                    url: current_id,
                    status_code: status.as_u16(),
                });

                if target_host.as_deref() != Some(host) {
                    let state = match target_host {
                        Some(key) if self.crawl_hosts.contains(&key) => {
                            debug!("Redirect target {} belongs to crawled host {}", target_id, key);
                            PageState::Redirect
                        }
                        _ => PageState::External,
                    };
                    let result = PageResult::terminal(task, hops, target_id, state, None);
                    return Fetched { result, responded };
                }

                if !robots.is_allowed(&target_id) {
                    debug!("Redirect target disallowed by robots.txt: {}", target_id);
                    let result = PageResult::terminal(task, hops, target_id, PageState::DisabledByRobots, None);
                    return Fetched { result, responded };
                }

                current = match Url::parse(&target_id) {
                    Ok(url) => url,
                    Err(_) => target,
                };
                continue;
            }

            let result = self.classify(task, hops, current, host, response).await;
            return Fetched { result, responded };
        }
    }

    /// Classifies a non-redirect response
    async fn classify(
        &self,
        task: &Task,
        hops: Vec<RedirectHop>,
        url: Url,
        host: &str,
        response: reqwest::Response,
    ) -> PageResult {
        let final_url = url.to_string();
        let status = response.status();

        if !status.is_success() {
            if status == StatusCode::NOT_FOUND || status == StatusCode::UNAUTHORIZED {
                warn!("HTTP {} for {} (host {})", status.as_u16(), final_url, host);
            } else {
                error!("HTTP {} for {} (host {})", status.as_u16(), final_url, host);
            }
            return PageResult::terminal(task, hops, final_url, PageState::ErrorStatusCode, Some(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !is_supported_content_type(&content_type) {
            debug!("Unsupported content type {:?} for {}", content_type, final_url);
            return PageResult::terminal(task, hops, final_url, PageState::UnsupportedFormat, Some(status.as_u16()));
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to read body of {} (host {}): {}", final_url, host, e);
                return PageResult::terminal(task, hops, final_url, PageState::AnswerError, Some(status.as_u16()));
            }
        };

        let extracted = match self.extractor.extract(&body, &content_type, &url) {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!("Extraction failed for {} (host {}): {}", final_url, host, e);
                let state = match e {
                    ExtractError::Encoding(_) => PageState::EncodingError,
                    ExtractError::Parse(_) => PageState::ParseError,
                };
                return PageResult::terminal(task, hops, final_url, state, Some(status.as_u16()));
            }
        };

        for (href, reason) in &extracted.wrong_links {
            debug!("Skipping malformed link {:?} on {}: {}", href, final_url, reason);
        }

        if !extracted.allow_follow {
            debug!("nofollow on {}, links discarded", final_url);
            return PageResult::terminal(task, hops, final_url, PageState::NoFollow, Some(status.as_u16()));
        }

        let hash = hex::encode(Sha256::digest(&body));
        let stored: &[u8] = if extracted.allow_index { &body } else { &[] };
        let compressed = match compress_body(stored) {
            Ok(compressed) => compressed,
            Err(e) => {
                error!("Failed to compress body of {}: {}", final_url, e);
                return PageResult::terminal(task, hops, final_url, PageState::AnswerError, Some(status.as_u16()));
            }
        };

        let mut result = PageResult::terminal(task, hops, final_url, PageState::Success, Some(status.as_u16()));
        result.content = Some(FetchedContent {
            hash,
            body: compressed,
            title: extracted.title,
        });
        result.links = extracted.links;
        result
    }
}

/// Returns true for HTML content types; a missing header counts as HTML
pub fn is_supported_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    mime.is_empty() || mime == "text/html" || mime == "application/xhtml+xml"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::extractor::HtmlExtractor;
    use crate::storage::decompress_body;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(max_redirects: u32) -> PageFetcher {
        let client = Client::builder().redirect(Policy::none()).build().unwrap();
        PageFetcher::new(client, Arc::new(HtmlExtractor), max_redirects)
    }

    fn task(server: &MockServer, route: &str) -> Task {
        Task {
            url: format!("{}{}", server.uri(), route),
            host_id: 1,
        }
    }

    fn host(server: &MockServer) -> String {
        host_key(&Url::parse(&server.uri()).unwrap()).unwrap()
    }

    fn allow_all() -> RobotsPolicy {
        RobotsPolicy::allow_all("hostcrawl")
    }

    #[test]
    fn test_supported_content_types() {
        assert!(is_supported_content_type("text/html"));
        assert!(is_supported_content_type("TEXT/HTML; charset=utf-8"));
        assert!(is_supported_content_type("application/xhtml+xml"));
        assert!(is_supported_content_type(""));
        assert!(!is_supported_content_type("application/pdf"));
        assert!(!is_supported_content_type("text/plain"));
    }

    #[tokio::test]
    async fn test_success_carries_content_and_links() {
        let server = MockServer::start().await;
        let body = r#"<html><head><title>Home</title></head><body><a href="/a">a</a></body></html>"#;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body).insert_header("content-type", "text/html"))
            .mount(&server)
            .await;

        let fetched = fetcher(10).fetch(&task(&server, "/"), &host(&server), &allow_all()).await;
        assert!(fetched.responded);

        let result = fetched.result;
        assert_eq!(result.state, PageState::Success);
        assert_eq!(result.status_code, Some(200));
        assert!(result.hops.is_empty());

        let content = result.content.unwrap();
        assert_eq!(content.title, "Home");
        assert_eq!(content.hash, hex::encode(Sha256::digest(body.as_bytes())));
        assert_eq!(decompress_body(&content.body).unwrap(), body.as_bytes());
        assert!(result.links.contains_key(&format!("{}/a", server.uri())));
    }

    #[tokio::test]
    async fn test_robots_disallow_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let robots = RobotsPolicy::from_content("User-agent: *\nDisallow: /private", "hostcrawl");
        let fetched = fetcher(10).fetch(&task(&server, "/private"), &host(&server), &robots).await;

        assert!(!fetched.responded);
        assert_eq!(fetched.result.state, PageState::DisabledByRobots);
        assert_eq!(fetched.result.status_code, None);
    }

    #[tokio::test]
    async fn test_status_classification() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pdf"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "application/pdf"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/latin1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html></html>")
                    .insert_header("content-type", "text/html; charset=iso-8859-1"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/nofollow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<meta name="robots" content="nofollow"><a href="/x">x</a>"#)
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let f = fetcher(10);
        let h = host(&server);
        let cases = [
            ("/missing", PageState::ErrorStatusCode, Some(404)),
            ("/pdf", PageState::UnsupportedFormat, Some(200)),
            ("/latin1", PageState::EncodingError, Some(200)),
            ("/nofollow", PageState::NoFollow, Some(200)),
        ];

        for (route, state, status) in cases {
            let result = f.fetch(&task(&server, route), &h, &allow_all()).await.result;
            assert_eq!(result.state, state, "{}", route);
            assert_eq!(result.status_code, status, "{}", route);
            assert!(result.content.is_none(), "{}", route);
            assert!(result.links.is_empty(), "{}", route);
        }
    }

    #[tokio::test]
    async fn test_noindex_keeps_hash_but_not_body() {
        let server = MockServer::start().await;
        let body = r#"<meta name="robots" content="noindex"><a href="/next">n</a>"#;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body).insert_header("content-type", "text/html"))
            .mount(&server)
            .await;

        let result = fetcher(10).fetch(&task(&server, "/"), &host(&server), &allow_all()).await.result;
        assert_eq!(result.state, PageState::Success);
        let content = result.content.unwrap();
        assert_eq!(content.hash, hex::encode(Sha256::digest(body.as_bytes())));
        assert!(decompress_body(&content.body).unwrap().is_empty());
        assert_eq!(result.links.len(), 1);
    }

    #[tokio::test]
    async fn test_redirect_chain_records_hops() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>new</p>").insert_header("content-type", "text/html"))
            .mount(&server)
            .await;

        let result = fetcher(10).fetch(&task(&server, "/old"), &host(&server), &allow_all()).await.result;
        assert_eq!(result.state, PageState::Success);
        assert_eq!(result.final_url, format!("{}/new", server.uri()));
        assert_eq!(
            result.hops,
            vec![RedirectHop {
                url: format!("{}/old", server.uri()),
                status_code: 301
            }]
        );
    }

    #[tokio::test]
    async fn test_off_host_redirect_is_external() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/away"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "https://elsewhere.example/landing"))
            .mount(&server)
            .await;

        let result = fetcher(10).fetch(&task(&server, "/away"), &host(&server), &allow_all()).await.result;
        assert_eq!(result.state, PageState::External);
        assert_eq!(result.final_url, "https://elsewhere.example/landing");
        assert_eq!(result.hops.len(), 1);
    }

    #[tokio::test]
    async fn test_redirect_to_crawled_host_is_handed_over() {
        let server = MockServer::start().await;
        let other = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/moved"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", format!("{}/x", other.uri()).as_str()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&other)
            .await;

        let fetcher = fetcher(10).with_crawl_hosts([host(&server), host(&other)]);
        let result = fetcher.fetch(&task(&server, "/moved"), &host(&server), &allow_all()).await.result;
        assert_eq!(result.state, PageState::Redirect);
        assert_eq!(result.final_url, format!("{}/x", other.uri()));
        assert_eq!(result.hops.len(), 1);
        assert!(result.content.is_none());
    }

    #[tokio::test]
    async fn test_redirect_limit_abandons_chain() {
        let server = MockServer::start().await;
        for i in 0..3 {
            Mock::given(method("GET"))
                .and(path(format!("/r{}", i)))
                .respond_with(ResponseTemplate::new(302).insert_header("location", format!("/r{}", i + 1).as_str()))
                .mount(&server)
                .await;
        }

        let result = fetcher(3).fetch(&task(&server, "/r0"), &host(&server), &allow_all()).await.result;
        assert_eq!(result.state, PageState::ConnectError);
        assert_eq!(result.final_url, result.url);
        assert!(result.hops.is_empty());
    }

    #[tokio::test]
    async fn test_connect_error() {
        let server = MockServer::start().await;
        let t = task(&server, "/");
        let h = host(&server);
        drop(server);

        let fetched = fetcher(10).fetch(&t, &h, &allow_all()).await;
        assert!(!fetched.responded);
        assert_eq!(fetched.result.state, PageState::ConnectError);
    }
}
