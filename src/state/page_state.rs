/// Page state definitions for resolved URLs
///
/// Every PageMeta carries exactly one of these. All of them are terminal:
/// the implicit initial state is "unfetched", which is represented by a
/// URL record with `loaded = false` and no PageMeta at all.
use std::fmt;

/// Terminal state of a fetched (or deliberately skipped) page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageState {
    /// Page was fetched and its content persisted
    Success,

    /// Connection failed, timed out, or the redirect chain was too long
    ConnectError,

    /// Server answered with a non-2xx status
    ErrorStatusCode,

    /// Content-Type is not HTML
    UnsupportedFormat,

    /// Response body could not be read
    AnswerError,

    /// Extraction transform could not parse the body
    ParseError,

    /// Body is not in a supported character encoding
    EncodingError,

    /// Content hash matches an earlier page; `origin` points at it
    Duplicate,

    /// Redirect target lies outside the configured hosts
    External,

    /// Page asked not to be followed; links discarded
    NoFollow,

    /// robots.txt disallows the URL; no request was made
    DisabledByRobots,

    /// Intermediate hop of a redirect chain
    Redirect,
}

impl PageState {
    /// Returns true if this page owns a Content row
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if this represents a fetch or processing failure
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectError
                | Self::ErrorStatusCode
                | Self::UnsupportedFormat
                | Self::AnswerError
                | Self::ParseError
                | Self::EncodingError
        )
    }

    /// Returns true if outgoing links of a page in this state are recorded
    pub fn follows_links(&self) -> bool {
        matches!(self, Self::Success | Self::Duplicate)
    }

    /// Converts the page state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ConnectError => "connect_error",
            Self::ErrorStatusCode => "error_status_code",
            Self::UnsupportedFormat => "unsupported_format",
            Self::AnswerError => "answer_error",
            Self::ParseError => "parse_error",
            Self::EncodingError => "encoding_error",
            Self::Duplicate => "duplicate",
            Self::External => "external",
            Self::NoFollow => "no_follow",
            Self::DisabledByRobots => "disabled_by_robots",
            Self::Redirect => "redirect",
        }
    }

    /// Parses a page state from its database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        Self::all_states()
            .into_iter()
            .find(|state| state.to_db_string() == s)
    }

    /// Returns all possible page states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Success,
            Self::ConnectError,
            Self::ErrorStatusCode,
            Self::UnsupportedFormat,
            Self::AnswerError,
            Self::ParseError,
            Self::EncodingError,
            Self::Duplicate,
            Self::External,
            Self::NoFollow,
            Self::DisabledByRobots,
            Self::Redirect,
        ]
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
