use crate::UrlError;
use url::form_urlencoded;
use url::Url;

/// Tracking query parameters dropped during normalization
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "yclid"];

/// Normalizes a URL into the canonical string used as its frontier identity
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject anything that is not http(s) with a host
/// 2. Lowercase the host and drop the scheme's default port (done by `url`)
/// 3. Normalize the path:
///    - Remove dot segments and empty segments (`//`)
///    - Remove the trailing slash (except for root `/`)
/// 4. Remove the fragment
/// 5. Remove tracking query parameters (`utm_*`, `fbclid`, ...)
/// 6. Sort the remaining query pairs, keeping their original encoding, and
///    drop an empty query
///
/// The function is idempotent: feeding its output back in yields the same
/// string, which is what makes `loaded` flip exactly once per page.
///
/// # Examples
///
/// ```
/// use hostcrawl::url::normalize_url;
///
/// let url = normalize_url("https://EXAMPLE.COM:443/a/../page/?b=2&a=1#top").unwrap();
/// assert_eq!(url, "https://example.com/page?a=1&b=2");
/// ```
pub fn normalize_url(url_str: &str) -> Result<String, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(url)
}

/// Normalizes an already-parsed (e.g. link-resolved) URL
pub fn normalize_parsed(mut url: Url) -> Result<String, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {
            let lowered = host.to_lowercase();
            if lowered != host {
                url.set_host(Some(&lowered))
                    .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;
            }
        }
        _ => return Err(UrlError::MissingHost),
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&params.join("&")));
        }
    }

    Ok(url.to_string())
}

/// Removes dot segments, empty segments and the trailing slash
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Keeps non-tracking `key=value` pairs exactly as encoded, sorted
fn filter_and_sort_query_params(url: &Url) -> Vec<String> {
    let Some(query) = url.query() else {
        return Vec::new();
    };

    let mut params: Vec<String> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let raw_key = pair.split('=').next().unwrap_or("");
            let key = form_urlencoded::parse(raw_key.as_bytes())
                .next()
                .map(|(key, _)| key.into_owned())
                .unwrap_or_default();
            !is_tracking_param(&key)
        })
        .map(str::to_string)
        .collect();

    params.sort();
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_scheme() {
        assert_eq!(
            normalize_url("http://example.com/page").unwrap(),
            "http://example.com/page"
        );
    }

    #[test]
    fn test_remove_trailing_slash() {
        assert_eq!(
            normalize_url("https://example.com/page/").unwrap(),
            "https://example.com/page"
        );
    }

    #[test]
    fn test_keep_root_slash() {
        assert_eq!(
            normalize_url("https://example.com").unwrap(),
            "https://example.com/"
        );
    }

    #[test]
    fn test_remove_fragment() {
        assert_eq!(
            normalize_url("https://example.com/page#section").unwrap(),
            "https://example.com/page"
        );
    }

    #[test]
    fn test_default_port_dropped_custom_port_kept() {
        assert_eq!(
            normalize_url("https://example.com:443/").unwrap(),
            "https://example.com/"
        );
        assert_eq!(
            normalize_url("http://127.0.0.1:8080/a").unwrap(),
            "http://127.0.0.1:8080/a"
        );
    }

    #[test]
    fn test_tracking_params_removed_and_sorted() {
        assert_eq!(
            normalize_url("https://example.com/p?keep=yes&utm_medium=email&another=value&fbclid=1")
                .unwrap(),
            "https://example.com/p?another=value&keep=yes"
        );
        assert_eq!(
            normalize_url("https://example.com/p?utm_source=a").unwrap(),
            "https://example.com/p"
        );
    }

    #[test]
    fn test_query_encoding_is_preserved() {
        let f0 = normalize_url("https://example.com/p?a=%F0").unwrap();
        let f1 = normalize_url("https://example.com/p?a=%F1").unwrap();
        assert_eq!(f0, "https://example.com/p?a=%F0");
        assert_eq!(f1, "https://example.com/p?a=%F1");
        assert_ne!(f0, f1);

        assert_eq!(
            normalize_url("https://example.com/p?z=%26x&a=b%3Dc&utm_source=%41").unwrap(),
            "https://example.com/p?a=b%3Dc&z=%26x"
        );
        assert_eq!(
            normalize_url("https://example.com/p?b=1&&a=2&").unwrap(),
            "https://example.com/p?a=2&b=1"
        );
    }

    #[test]
    fn test_dot_and_empty_segments() {
        assert_eq!(
            normalize_url("https://example.com///a/../b/./c//").unwrap(),
            "https://example.com/b/c"
        );
        assert_eq!(
            normalize_url("https://example.com/../page").unwrap(),
            "https://example.com/page"
        );
    }

    #[test]
    fn test_lowercase_host_only() {
        assert_eq!(
            normalize_url("https://EXAMPLE.COM/Page").unwrap(),
            "https://example.com/Page"
        );
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            normalize_url("ftp://example.com/page"),
            Err(UrlError::InvalidScheme(_))
        ));
        assert!(matches!(normalize_url("not a url"), Err(UrlError::Parse(_))));
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "http://WWW.Example.com:80/a/./b/../c/?z=1&a=%26x&utm_x=1#f",
            "https://example.com/search?q=hello world&empty",
            "https://example.com/%7Euser/",
            "https://example.com/?",
            "https://example.com/p?a=%F0&b=%zz&c=x+y",
            "https://xn--bcher-kva.example/path",
        ];

        for input in inputs {
            let once = normalize_url(input).unwrap();
            let twice = normalize_url(&once).unwrap();
            assert_eq!(once, twice, "normalization not idempotent for {}", input);
        }
    }
}
