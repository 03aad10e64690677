use url::Url;

/// Extracts the host key of a URL: the lowercase host, plus `:port` when the
/// URL carries a non-default port
///
/// Two URLs belong to the same crawl host exactly when their host keys are
/// equal, so `http://127.0.0.1:8080/` and `http://127.0.0.1:9090/` are
/// different hosts.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use hostcrawl::url::host_key;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(host_key(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(host_key(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}

/// Builds the synthetic "host root" URL (`scheme://host[:port]/`) used to
/// seed a host that has no pending frontier entries
pub fn host_root(url: &Url) -> Option<String> {
    let key = host_key(url)?;
    Some(format!("{}://{}/", url.scheme(), key))
}

/// Strips the port from a host key
pub fn host_name(key: &str) -> &str {
    match key.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => key,
    }
}
