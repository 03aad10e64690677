//! Robots.txt handling module
//!
//! This module fetches robots.txt once per host, persists the answer as part
//! of the Host record, and builds the [`RobotsPolicy`] consulted before every
//! page fetch. A host whose robots.txt cannot be obtained or parsed is left
//! out of the crawl.

mod parser;

pub use parser::RobotsPolicy;

use crate::storage::{HostRecord, Storage};
use crate::url::host_key;
use crate::{CrawlError, UrlError};
use reqwest::header::LOCATION;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// Redirects followed while fetching robots.txt itself
const MAX_ROBOTS_REDIRECTS: usize = 5;

/// Errors that exclude a host from the crawl
#[derive(Debug, Error)]
pub enum RobotsError {
    #[error("Failed to fetch {url}: {source}")]
    Fetch { url: String, source: reqwest::Error },

    #[error("robots.txt of {host} unavailable (status {status})")]
    Unavailable { host: String, status: u16 },

    #[error("Unparsable robots.txt for {host}: {reason}")]
    Parse { host: String, reason: String },
}

/// Fetches robots.txt for a host
///
/// # Arguments
///
/// * `client` - HTTP client (redirects are followed here, up to a small bound)
/// * `root` - Any URL on the host; only scheme, host and port are used
///
/// # Returns
///
/// * `Ok((status, body))` - The final HTTP status and raw body bytes
/// * `Err(RobotsError)` - The request itself failed
pub async fn fetch_robots(client: &Client, root: &Url) -> Result<(u16, Vec<u8>), RobotsError> {
    let mut target = root.join("/robots.txt").map_err(|e| RobotsError::Parse {
        host: root.as_str().to_string(),
        reason: e.to_string(),
    })?;

    for _ in 0..=MAX_ROBOTS_REDIRECTS {
        let response = client
            .get(target.clone())
            .send()
            .await
            .map_err(|source| RobotsError::Fetch {
                url: target.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_redirection() {
            let next = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|location| target.join(location).ok());
            if let Some(next) = next {
                debug!("robots.txt redirect {} -> {}", target, next);
                target = next;
                continue;
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| RobotsError::Fetch {
                url: target.to_string(),
                source,
            })?;
        return Ok((status.as_u16(), body.to_vec()));
    }

    Err(RobotsError::Unavailable {
        host: root.as_str().to_string(),
        status: 310,
    })
}

/// Builds a policy from a stored (or freshly fetched) robots.txt answer
///
/// 2xx bodies are evaluated and must be UTF-8, 4xx means "no robots.txt,
/// everything allowed", anything else makes the host unavailable.
pub fn policy_from_answer(
    host: &str,
    status: u16,
    body: &[u8],
    user_agent: &str,
) -> Result<RobotsPolicy, RobotsError> {
    match status {
        200..=299 => {
            let content = std::str::from_utf8(body).map_err(|e| RobotsError::Parse {
                host: host.to_string(),
                reason: e.to_string(),
            })?;
            Ok(RobotsPolicy::from_content(content, user_agent))
        }
        400..=499 => Ok(RobotsPolicy::allow_all(user_agent)),
        _ => Err(RobotsError::Unavailable {
            host: host.to_string(),
            status,
        }),
    }
}

/// Resolves the Host record and robots policy of one configured host
///
/// If the store already knows the host its persisted robots.txt is parsed
/// directly and nothing is fetched. Otherwise robots.txt is fetched, checked,
/// and persisted with a new Host record. Answers that make the host
/// unusable are not persisted, so a later run tries again.
///
/// Must run before the write worker starts; it is the only code outside the
/// write worker that mutates the store.
pub async fn resolve_host<S: Storage>(
    store: &mut S,
    client: &Client,
    root: &Url,
    user_agent: &str,
) -> Result<(HostRecord, RobotsPolicy), CrawlError> {
    let name = host_key(root).ok_or(UrlError::MissingHost)?;

    if let Some(record) = store.get_host(&name)? {
        debug!("Using stored robots.txt for {}", name);
        let policy = policy_from_answer(
            &name,
            record.robots_status_code,
            &record.robots_data,
            user_agent,
        )?;
        return Ok((record, policy));
    }

    let (status, body) = fetch_robots(client, root).await?;
    let policy = policy_from_answer(&name, status, &body, user_agent)?;

    if (400..500).contains(&status) {
        warn!("No robots.txt for {} (status {}), allowing all", name, status);
    }

    let record = store.insert_host(&name, status, &body)?;
    info!("Initialized host {} (id {}, robots status {})", name, record.id, status);

    Ok((record, policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;
    use reqwest::redirect::Policy;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const AGENT: &str = "hostcrawl";

    fn client() -> Client {
        Client::builder().redirect(Policy::none()).build().unwrap()
    }

    #[test]
    fn test_policy_from_status() {
        let policy = policy_from_answer("h", 200, b"User-agent: *\nDisallow: /x", AGENT).unwrap();
        assert!(!policy.is_allowed("http://h/x"));

        let policy = policy_from_answer("h", 404, b"not found", AGENT).unwrap();
        assert!(policy.is_allowed("http://h/x"));

        assert!(matches!(
            policy_from_answer("h", 503, b"", AGENT),
            Err(RobotsError::Unavailable { status: 503, .. })
        ));
        assert!(matches!(
            policy_from_answer("h", 200, &[0xff, 0xfe, 0x00], AGENT),
            Err(RobotsError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_fetches_once_and_persists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"))
            .expect(1)
            .mount(&server)
            .await;

        let mut store = SqliteStorage::open_in_memory().unwrap();
        let root = Url::parse(&server.uri()).unwrap();

        let (record, policy) = resolve_host(&mut store, &client(), &root, AGENT).await.unwrap();
        assert_eq!(record.robots_status_code, 200);
        assert!(!policy.is_allowed(&format!("{}/private", server.uri())));

        // Second resolution reads the stored record
        let (again, policy) = resolve_host(&mut store, &client(), &root, AGENT).await.unwrap();
        assert_eq!(again.id, record.id);
        assert!(!policy.is_allowed(&format!("{}/private", server.uri())));
    }

    #[tokio::test]
    async fn test_server_error_skips_host_without_persisting() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut store = SqliteStorage::open_in_memory().unwrap();
        let root = Url::parse(&server.uri()).unwrap();

        let result = resolve_host(&mut store, &client(), &root, AGENT).await;
        assert!(matches!(
            result,
            Err(CrawlError::Robots(RobotsError::Unavailable { status: 500, .. }))
        ));
        assert!(store.get_host(&host_key(&root).unwrap()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_robots_redirect_is_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/real-robots.txt"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/real-robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /"))
            .mount(&server)
            .await;

        let root = Url::parse(&server.uri()).unwrap();
        let (status, body) = fetch_robots(&client(), &root).await.unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, b"User-agent: *\nDisallow: /".to_vec());
    }
}
