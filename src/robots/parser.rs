//! Robots.txt policy implementation
//!
//! This module evaluates robots.txt content using the robotstxt crate.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt policy of one host, bound to one user-agent group
///
/// This is a wrapper around the robotstxt crate's matcher, providing the
/// `Allow(url)` predicate the per-host worker consults before every fetch.
#[derive(Debug, Clone)]
pub struct RobotsPolicy {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
    /// Whether to allow all (true = allow all, false = evaluate content)
    allow_all: bool,
    /// User-agent group token the rules are evaluated for
    user_agent: String,
}

impl RobotsPolicy {
    /// Creates a policy from raw robots.txt content
    ///
    /// # Arguments
    ///
    /// * `content` - The raw robots.txt file content
    /// * `user_agent` - The user-agent token matched against `User-agent:` groups
    pub fn from_content(content: &str, user_agent: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
            user_agent: user_agent.to_string(),
        }
    }

    /// Creates a permissive policy that allows everything
    ///
    /// Used when the host answers robots.txt with a 4xx status.
    pub fn allow_all(user_agent: &str) -> Self {
        Self {
            content: String::new(),
            allow_all: true,
            user_agent: user_agent.to_string(),
        }
    }

    /// Checks if a URL may be fetched
    ///
    /// # Arguments
    ///
    /// * `url` - The absolute URL to check (e.g., "https://example.com/page.html")
    ///
    /// # Returns
    ///
    /// * `true` - If the URL is allowed
    /// * `false` - If the URL is disallowed
    pub fn is_allowed(&self, url: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, &self.user_agent, url)
    }
}
