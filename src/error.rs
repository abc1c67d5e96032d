//! Error taxonomy for the crawl pipeline.
//!
//! Extractors and the browser layer raise [`CrawlError`] outward. Only the
//! crawl orchestrator catches and continues, and it always routes the error
//! through the failure recorder first.

use thiserror::Error;

/// Result alias used across the pipeline.
pub type CrawlResult<T> = Result<T, CrawlError>;

#[derive(Error, Debug)]
pub enum CrawlError {
    /// The page failed to load, or still reported an error state after the
    /// single allowed reload.
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// A required element did not reach the awaited state within its bound.
    #[error("timed out after {timeout_ms}ms waiting for `{selector}`{}", visibility_suffix(.require_visible))]
    WaitTimeout {
        selector: String,
        timeout_ms: u64,
        require_visible: bool,
    },

    /// A required field resolved to empty (team name, roster container, ...).
    #[error("required {field} missing (`{selector}`)")]
    MissingData { field: String, selector: String },

    #[error("invalid selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },

    #[error("unit state {from} cannot move to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

fn visibility_suffix(require_visible: &bool) -> &'static str {
    if *require_visible { " to become visible" } else { "" }
}

impl CrawlError {
    /// Stable label used in structured logs and the crawl summary.
    pub fn kind(&self) -> &'static str {
        match self {
            CrawlError::Navigation { .. } => "navigation",
            CrawlError::WaitTimeout { .. } => "wait_timeout",
            CrawlError::MissingData { .. } => "missing_data",
            CrawlError::Selector { .. } => "selector",
            CrawlError::InvalidTransition { .. } => "invalid_transition",
            CrawlError::Io(_) => "io",
            CrawlError::Json(_) => "json",
            CrawlError::Http(_) => "http",
            CrawlError::Url(_) => "url",
        }
    }

    pub fn is_navigation(&self) -> bool {
        matches!(self, CrawlError::Navigation { .. })
    }

    #[cfg(test)]
    pub fn is_wait_timeout(&self) -> bool {
        matches!(self, CrawlError::WaitTimeout { .. })
    }

    pub(crate) fn missing(field: impl Into<String>, selector: impl Into<String>) -> Self {
        CrawlError::MissingData {
            field: field.into(),
            selector: selector.into(),
        }
    }

    pub(crate) fn navigation(url: impl Into<String>, reason: impl Into<String>) -> Self {
        CrawlError::Navigation {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels_are_stable() {
        assert_eq!(CrawlError::navigation("u", "r").kind(), "navigation");
        assert_eq!(CrawlError::missing("team name", "h2").kind(), "missing_data");
        let timeout = CrawlError::WaitTimeout {
            selector: "#box-score".to_string(),
            timeout_ms: 10_000,
            require_visible: false,
        };
        assert_eq!(timeout.kind(), "wait_timeout");
        assert!(timeout.is_wait_timeout());
    }

    #[test]
    fn test_wait_timeout_message_mentions_visibility() {
        let err = CrawlError::WaitTimeout {
            selector: "section".to_string(),
            timeout_ms: 500,
            require_visible: true,
        };
        assert_eq!(
            err.to_string(),
            "timed out after 500ms waiting for `section` to become visible"
        );
    }
}
