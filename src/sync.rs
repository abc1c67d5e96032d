//! Bounded waits for DOM conditions.
//!
//! Every read or interaction in the extractors is preceded by a wait with an
//! explicit bound. Expiry surfaces as [`CrawlError::WaitTimeout`]; nothing
//! here ever polls without a deadline.
//!
//! The synchronizer only answers "does the locator resolve (and is it
//! visible)". Whether the located shape is the expected one (one element vs.
//! a collection) is the caller's concern.

use crate::browser::{Locator, Tab};
use crate::error::{CrawlError, CrawlResult};
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, instrument};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub require_visible: bool,
    pub poll_interval: Duration,
}

impl WaitOptions {
    /// Wait for the locator to resolve to at least one element.
    pub fn present(timeout_ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms),
            require_visible: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Wait for the first located element to be visible.
    pub fn visible(timeout_ms: u64) -> Self {
        Self {
            require_visible: true,
            ..Self::present(timeout_ms)
        }
    }
}

/// Resolve once `locator` exists (and, if requested, is visible), or fail
/// with a single [`CrawlError::WaitTimeout`] after `opts.timeout`.
///
/// Errors other than "not there yet" (an invalid selector, a broken
/// context) are returned immediately.
#[instrument(level = "debug", skip(tab, opts), fields(%locator, timeout_ms = opts.timeout.as_millis() as u64, visible = opts.require_visible))]
pub async fn wait_for<T: Tab>(tab: &T, locator: &Locator, opts: WaitOptions) -> CrawlResult<()> {
    let poll = async {
        let mut ticker = interval(opts.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if condition_met(tab, locator, opts.require_visible).await? {
                return Ok::<(), CrawlError>(());
            }
        }
    };

    match timeout(opts.timeout, poll).await {
        Ok(result) => {
            if result.is_ok() {
                debug!("Wait condition met");
            }
            result
        }
        Err(_) => Err(CrawlError::WaitTimeout {
            selector: locator.to_string(),
            timeout_ms: opts.timeout.as_millis() as u64,
            require_visible: opts.require_visible,
        }),
    }
}

/// Like [`wait_for`], for elements that may legitimately never appear
/// (a dismissible consent dialog). Only a timeout is swallowed, as `false`.
pub async fn wait_optional<T: Tab>(
    tab: &T,
    locator: &Locator,
    opts: WaitOptions,
) -> CrawlResult<bool> {
    match wait_for(tab, locator, opts).await {
        Ok(()) => Ok(true),
        Err(CrawlError::WaitTimeout { .. }) => {
            debug!(%locator, "Optional element never appeared");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

async fn condition_met<T: Tab>(tab: &T, locator: &Locator, require_visible: bool) -> CrawlResult<bool> {
    if tab.count(locator).await? == 0 {
        return Ok(false);
    }
    if require_visible {
        return tab.is_visible(locator).await;
    }
    Ok(true)
}
