//! In-memory [`PageSource`] for tests.

use super::source::{Frame, PageSource};
use crate::error::{CrawlError, CrawlResult};
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

#[derive(Debug, Clone)]
enum Response {
    Frames(Vec<Frame>),
    Unreachable(String),
}

/// In-memory pages keyed by URL.
///
/// Each URL holds a queue of responses: every fetch consumes the next one
/// and the last response is repeated forever. That is enough to model a page
/// that errors once and recovers on reload.
#[derive(Debug, Default)]
pub struct FixtureSource {
    pages: HashMap<String, Vec<Response>>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a page that renders immediately.
    pub fn page(self, url: &str, markup: &str) -> Self {
        self.frames(url, vec![Frame::immediate(markup)])
    }

    /// Queue a page that renders in stages.
    pub fn frames(mut self, url: &str, frames: Vec<Frame>) -> Self {
        self.pages
            .entry(normalize(url))
            .or_default()
            .push(Response::Frames(frames));
        self
    }

    /// Queue a transport failure.
    pub fn unreachable(mut self, url: &str, reason: &str) -> Self {
        self.pages
            .entry(normalize(url))
            .or_default()
            .push(Response::Unreachable(reason.to_string()));
        self
    }

    /// Number of fetches served for `url` so far.
    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches
            .lock()
            .map(|counts| counts.get(&normalize(url)).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl PageSource for FixtureSource {
    async fn fetch(&self, url: &Url) -> CrawlResult<Vec<Frame>> {
        let key = url.to_string();
        let served = {
            let mut counts = self
                .fetches
                .lock()
                .map_err(|_| CrawlError::navigation(key.as_str(), "fixture lock poisoned"))?;
            let count = counts.entry(key.clone()).or_insert(0);
            *count += 1;
            *count - 1
        };

        let responses = self
            .pages
            .get(&key)
            .ok_or_else(|| CrawlError::navigation(key.as_str(), "no such page"))?;
        let response = responses
            .get(served)
            .or_else(|| responses.last())
            .ok_or_else(|| CrawlError::navigation(key.as_str(), "no such page"))?;

        match response {
            Response::Frames(frames) => Ok(frames.clone()),
            Response::Unreachable(reason) => Err(CrawlError::navigation(key.as_str(), reason.as_str())),
        }
    }
}

fn normalize(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_serves_queued_responses_then_repeats_last() {
        let source = FixtureSource::new()
            .page("https://example.com/a", "<p>first</p>")
            .page("https://example.com/a", "<p>second</p>");
        let url = Url::parse("https://example.com/a").unwrap();

        let first = source.fetch(&url).await.unwrap();
        let second = source.fetch(&url).await.unwrap();
        let third = source.fetch(&url).await.unwrap();

        assert_eq!(&*first[0].markup, "<p>first</p>");
        assert_eq!(&*second[0].markup, "<p>second</p>");
        assert_eq!(&*third[0].markup, "<p>second</p>");
        assert_eq!(source.fetch_count("https://example.com/a"), 3);
    }

    #[tokio::test]
    async fn test_fixture_unknown_url_is_navigation_error() {
        let source = FixtureSource::new();
        let url = Url::parse("https://example.com/missing").unwrap();
        let err = source.fetch(&url).await.unwrap_err();
        assert!(err.is_navigation());
    }

    #[tokio::test]
    async fn test_fixture_unreachable() {
        let source = FixtureSource::new().unreachable("https://example.com/down", "connection reset");
        let url = Url::parse("https://example.com/down").unwrap();
        let err = source.fetch(&url).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }
}
