//! URL handling module
//!
//! This module provides the URL Normalizer (the frontier's identity
//! function), host-key extraction and wildcard host filtering.

mod domain;
mod matcher;
mod normalize;

pub use domain::{host_key, host_name, host_root};
pub use matcher::matches_wildcard;
pub use normalize::{normalize_parsed, normalize_url};

use crate::UrlError;
use url::Url;

/// Resolves an `href` found on a page against the page URL and normalizes it
///
/// Returns `Ok(None)` for links that are not crawl targets at all
/// (`javascript:`, `mailto:`, `tel:`, `data:`, fragment-only anchors), and an
/// error for links that look like targets but cannot be resolved.
pub fn resolve_link(base: &Url, href: &str) -> Result<Option<(String, String)>, UrlError> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return Ok(None);
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return Ok(None);
    }

    let absolute = base
        .join(href)
        .map_err(|e| UrlError::Parse(format!("{}: {}", href, e)))?;

    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return Ok(None);
    }

    let host = host_key(&absolute).ok_or(UrlError::MissingHost)?;
    let normalized = normalize_parsed(absolute)?;
    Ok(Some((normalized, host)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/dir/page").unwrap()
    }

    #[test]
    fn test_resolve_relative() {
        let (url, host) = resolve_link(&base(), "other/").unwrap().unwrap();
        assert_eq!(url, "https://example.com/dir/other");
        assert_eq!(host, "example.com");
    }

    #[test]
    fn test_resolve_absolute_other_host() {
        let (url, host) = resolve_link(&base(), "http://Other.org:81/x#y")
            .unwrap()
            .unwrap();
        assert_eq!(url, "http://other.org:81/x");
        assert_eq!(host, "other.org:81");
    }

    #[test]
    fn test_skips_non_targets() {
        for href in ["", "#top", "javascript:void(0)", "MAILTO:a@b.c", "tel:123", "ftp://x.org/"] {
            assert!(resolve_link(&base(), href).unwrap().is_none(), "{}", href);
        }
    }

    #[test]
    fn test_unresolvable_is_error() {
        assert!(resolve_link(&base(), "http://[::1").is_err());
    }
}
