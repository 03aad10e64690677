use crate::config::types::{Config, CrawlerConfig, HostEntry, StorageConfig, UserAgentConfig};
use crate::url::host_key;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
///
/// The page budget is deliberately not checked: a non-positive budget is a
/// legal run that does nothing.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    validate_hosts(&config.hosts)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.batch_size < 1 || config.batch_size > 10_000 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be between 1 and 10000, got {}",
            config.batch_size
        )));
    }

    if config.max_redirects < 1 || config.max_redirects > 50 {
        return Err(ConfigError::Validation(format!(
            "max_redirects must be between 1 and 50, got {}",
            config.max_redirects
        )));
    }

    if config.task_queue_capacity < 1 {
        return Err(ConfigError::Validation(format!(
            "task_queue_capacity must be >= 1, got {}",
            config.task_queue_capacity
        )));
    }

    if config.result_queue_capacity < 1 {
        return Err(ConfigError::Validation(format!(
            "result_queue_capacity must be >= 1, got {}",
            config.result_queue_capacity
        )));
    }

    if config.politeness_delay > 60_000 {
        return Err(ConfigError::Validation(format!(
            "politeness_delay must be <= 60000ms, got {}ms",
            config.politeness_delay
        )));
    }

    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(
            "request_timeout must be >= 1 second".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates host roots: http(s) URLs with a host, each host listed once
fn validate_hosts(hosts: &[HostEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for entry in hosts {
        let url = Url::parse(&entry.root).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid host root '{}': {}", entry.root, e))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "Host root '{}' must use http or https",
                entry.root
            )));
        }

        let key = host_key(&url).ok_or_else(|| {
            ConfigError::InvalidUrl(format!("Host root '{}' has no host", entry.root))
        })?;

        if !seen.insert(key.clone()) {
            return Err(ConfigError::Validation(format!(
                "Host '{}' is configured more than once",
                key
            )));
        }
    }

    Ok(())
}

/// Validates a host filter pattern (supports a leading `*.` wildcard)
pub fn validate_host_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    // Check if it's a wildcard pattern
    if let Some(domain) = pattern.strip_prefix("*.") {
        // Validate the base domain part
        validate_domain_string(domain)?;
    } else {
        // Regular domain
        validate_domain_string(pattern)?;
    }

    Ok(())
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    // Check for invalid characters
    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    // Check that it doesn't start or end with a dot or hyphen
    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    // Check for consecutive dots
    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    // Must contain at least one dot (e.g., example.com, not just "example")
    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Basic email format check: must contain @ and have text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    // Domain part should contain at least one dot
    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_host_pattern() {
        assert!(validate_host_pattern("example.com").is_ok());
        assert!(validate_host_pattern("*.example.com").is_ok());
        assert!(validate_host_pattern("sub.example.com").is_ok());

        assert!(validate_host_pattern("").is_err());
        assert!(validate_host_pattern("*.").is_err());
        assert!(validate_host_pattern("example").is_err());
        assert!(validate_host_pattern(".example.com").is_err());
        assert!(validate_host_pattern("example.com.").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
    }

    #[test]
    fn test_validate_hosts() {
        let host = |root: &str| HostEntry {
            root: root.to_string(),
        };

        assert!(validate_hosts(&[host("https://example.com/"), host("http://127.0.0.1:8080/")]).is_ok());
        assert!(validate_hosts(&[]).is_ok());

        assert!(matches!(
            validate_hosts(&[host("not a url")]),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_hosts(&[host("ftp://example.com/")]),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_hosts(&[host("https://example.com/"), host("https://EXAMPLE.com/other")]),
            Err(ConfigError::Validation(_))
        ));
    }
}
