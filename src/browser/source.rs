//! Where the markup engine gets its documents from.
//!
//! A [`PageSource`] turns a URL into a sequence of timed [`Frame`]s. Each
//! frame becomes the live document once its delay since navigation has
//! elapsed, which is how asynchronously rendered pages are modelled: a page
//! that paints its box score two seconds after load is two frames.

use crate::error::{CrawlError, CrawlResult};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// One rendering state of a page.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Time after navigation at which this markup becomes live.
    pub delay: Duration,
    pub markup: Arc<str>,
}

impl Frame {
    pub fn immediate(markup: impl Into<Arc<str>>) -> Self {
        Self {
            delay: Duration::ZERO,
            markup: markup.into(),
        }
    }

    #[cfg(test)]
    pub fn after(delay: Duration, markup: impl Into<Arc<str>>) -> Self {
        Self {
            delay,
            markup: markup.into(),
        }
    }
}

pub trait PageSource {
    async fn fetch(&self, url: &Url) -> CrawlResult<Vec<Frame>>;
}

/// Live pages over HTTP. The response body is the single frame.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(user_agent: &str, request_timeout: Duration) -> CrawlResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl PageSource for HttpSource {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> CrawlResult<Vec<Frame>> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| CrawlError::navigation(url.as_str(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // Browsers still render error pages; the title check decides.
            warn!(%status, "Non-success status; rendering body anyway");
        }
        let body = response
            .text()
            .await
            .map_err(|e| CrawlError::navigation(url.as_str(), e.to_string()))?;
        debug!(bytes = body.len(), %status, "Fetched page");
        Ok(vec![Frame::immediate(body)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_delays() {
        assert_eq!(Frame::immediate("<p>a</p>").delay, Duration::ZERO);
        let late = Frame::after(Duration::from_secs(2), "<p>b</p>");
        assert_eq!(late.delay, Duration::from_secs(2));
        assert_eq!(&*late.markup, "<p>b</p>");
    }

    #[test]
    fn test_http_source_builds_with_user_agent() {
        assert!(HttpSource::new("hoop_crawl/0.1", Duration::from_secs(5)).is_ok());
    }
}
