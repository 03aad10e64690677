//! HTML extraction transform
//!
//! This module turns a fetched body into the pieces the crawl cares about:
//! - Links to follow (from <a> tags and canonical links), normalized and keyed by host
//! - Links that could not be resolved, with the reason
//! - Page title
//! - `<meta name="robots">` index/follow permissions

use crate::url::resolve_link;
use scraper::{Html, Selector};
use std::collections::HashMap;
use thiserror::Error;
use tracing::trace;
use url::Url;

/// Errors an extractor can report; they become terminal page states
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unsupported encoding: {0}")]
    Encoding(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Extracted information from a page
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    /// Normalized link URL -> host key
    pub links: HashMap<String, String>,

    /// Raw href -> reason it was rejected
    pub wrong_links: HashMap<String, String>,

    /// The page title (from <title> tag), empty when absent
    pub title: String,

    /// False when the page carries `noindex`
    pub allow_index: bool,

    /// False when the page carries `nofollow`
    pub allow_follow: bool,
}

/// Turns a response body into links and metadata
pub trait Extractor: Send + Sync {
    /// Extracts links and metadata from `body`
    ///
    /// # Arguments
    ///
    /// * `body` - Raw (decoded transfer encoding) response bytes
    /// * `content_type` - The `Content-Type` header value, empty if absent
    /// * `base_url` - URL the body was fetched from
    fn extract(
        &self,
        body: &[u8],
        content_type: &str,
        base_url: &Url,
    ) -> Result<Extracted, ExtractError>;
}

/// Default extractor built on `scraper`
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links and data URIs
/// - Non-HTTP(S) URLs after resolution
///
/// Relative links resolve against `<base href>` when the page has one.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlExtractor;

impl Extractor for HtmlExtractor {
    fn extract(
        &self,
        body: &[u8],
        content_type: &str,
        base_url: &Url,
    ) -> Result<Extracted, ExtractError> {
        if let Some(charset) = declared_charset(content_type) {
            if !matches!(charset.as_str(), "utf-8" | "utf8" | "us-ascii" | "ascii") {
                return Err(ExtractError::Encoding(charset));
            }
        }

        let html = std::str::from_utf8(body)
            .map_err(|e| ExtractError::Encoding(format!("invalid UTF-8: {}", e)))?;

        let document = Html::parse_document(html);
        let base = document_base(&document, base_url)?;
        let (allow_index, allow_follow) = robots_meta(&document);

        let mut extracted = Extracted {
            title: extract_title(&document),
            allow_index,
            allow_follow,
            ..Extracted::default()
        };

        for href in candidate_hrefs(&document) {
            match resolve_link(&base, &href) {
                Ok(Some((url, host))) => {
                    extracted.links.insert(url, host);
                }
                Ok(None) => {}
                Err(e) => {
                    trace!("Rejected link {} on {}: {}", href, base_url, e);
                    extracted.wrong_links.insert(href, e.to_string());
                }
            }
        }

        Ok(extracted)
    }
}

/// Reads the `charset=` parameter of a Content-Type value, lowercased
fn declared_charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_ascii_lowercase())
        } else {
            None
        }
    })
}

/// Resolves `<base href>` against the fetch URL
fn document_base(document: &Html, base_url: &Url) -> Result<Url, ExtractError> {
    let Ok(selector) = Selector::parse("base[href]") else {
        return Ok(base_url.clone());
    };

    match document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr("href"))
    {
        Some(href) => base_url
            .join(href.trim())
            .map_err(|e| ExtractError::Parse(format!("bad <base href=\"{}\">: {}", href, e))),
        None => Ok(base_url.clone()),
    }
}

/// Reads `<meta name="robots">`: (allow_index, allow_follow)
fn robots_meta(document: &Html) -> (bool, bool) {
    let mut allow_index = true;
    let mut allow_follow = true;

    let Ok(selector) = Selector::parse("meta[name][content]") else {
        return (allow_index, allow_follow);
    };

    for element in document.select(&selector) {
        let is_robots = element
            .value()
            .attr("name")
            .is_some_and(|name| name.trim().eq_ignore_ascii_case("robots"));
        if !is_robots {
            continue;
        }

        let content = element.value().attr("content").unwrap_or_default();
        for directive in content.split(',').map(|d| d.trim().to_ascii_lowercase()) {
            match directive.as_str() {
                "noindex" => allow_index = false,
                "nofollow" => allow_follow = false,
                "none" => {
                    allow_index = false;
                    allow_follow = false;
                }
                _ => {}
            }
        }
    }

    (allow_index, allow_follow)
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> String {
    let Ok(title_selector) = Selector::parse("title") else {
        return String::new();
    };

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Collects raw hrefs of anchors and canonical links
fn candidate_hrefs(document: &Html) -> Vec<String> {
    let mut hrefs = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            // Skip if it has the download attribute
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                hrefs.push(href.to_string());
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                hrefs.push(href.to_string());
            }
        }
    }

    hrefs
}
