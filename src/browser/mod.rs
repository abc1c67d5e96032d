//! Narrow capability contract consumed from the browser-automation engine.
//!
//! The crawl never talks to an engine directly. It goes through three seams:
//!
//! - [`Tab`]: one page of an execution context (navigate, query, click)
//! - [`IsolatedContext`]: a tab that owns its own context and can be closed
//! - [`Browser`]: hands out a fresh isolated context per crawl unit
//!
//! Elements are addressed with [`Locator`]s, which are lazy: a locator is a
//! chain of CSS steps that is re-resolved against the live document on every
//! query. That is what lets the synchronizer observe content that renders
//! after navigation. [`Node`] pairs a locator with a tab and exposes the
//! familiar node-handle surface (`exists`, `is_visible`, `inner_text`, ...).
//!
//! One engine ships with the crate: [`markup::MarkupBrowser`], which renders
//! documents obtained from a [`source::PageSource`].

#[cfg(test)]
pub mod fixture;
pub mod markup;
pub mod source;

use crate::error::CrawlResult;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// One step of a [`Locator`]: a CSS selector, optionally narrowed to the
/// element at a position among its matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub selector: String,
    pub index: Option<usize>,
}

/// Lazily-resolved element address.
///
/// The first step is matched against the whole document; each later step is
/// matched against the descendants of the previous step's elements, in
/// document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    steps: Vec<Step>,
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            steps: vec![Step {
                selector: selector.into(),
                index: None,
            }],
        }
    }

    /// Descend into the elements matched so far.
    pub fn find(&self, selector: impl Into<String>) -> Self {
        let mut steps = self.steps.clone();
        steps.push(Step {
            selector: selector.into(),
            index: None,
        });
        Self { steps }
    }

    /// Narrow the last step to its `index`-th match.
    pub fn nth(&self, index: usize) -> Self {
        let mut steps = self.steps.clone();
        if let Some(last) = steps.last_mut() {
            last.index = Some(index);
        }
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(" >> ")?;
            }
            f.write_str(&step.selector)?;
            if let Some(index) = step.index {
                write!(f, "[{index}]")?;
            }
        }
        Ok(())
    }
}

/// Identity of an execution context, unique within one browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// How much state a crawl unit's context shares with the rest of the crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    /// A fresh tab in a shared session. Leaves nothing on disk.
    #[default]
    Tab,
    /// A fresh full session. Keeps a transient on-disk session journal
    /// until the context closes.
    Session,
}

/// Callback fired once a context has fully closed, with the path of any
/// transient on-disk artifact the context leaves behind.
pub type CloseCallback = Box<dyn FnOnce(ContextId, Option<PathBuf>) + Send>;

/// Hooks registered on a context when it is created.
#[derive(Default)]
pub struct ContextHooks {
    on_closed: Option<CloseCallback>,
}

impl ContextHooks {
    pub fn on_closed<F>(callback: F) -> Self
    where
        F: FnOnce(ContextId, Option<PathBuf>) + Send + 'static,
    {
        Self {
            on_closed: Some(Box::new(callback)),
        }
    }

    /// Consume the hooks, running the close callback if one was registered.
    pub fn fire_closed(self, id: ContextId, artifact: Option<PathBuf>) {
        if let Some(callback) = self.on_closed {
            callback(id, artifact);
        }
    }
}

impl fmt::Debug for ContextHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHooks")
            .field("on_closed", &self.on_closed.is_some())
            .finish()
    }
}

/// Page-level capabilities of an execution context.
///
/// Element queries that address several elements operate on the first match,
/// except [`Tab::count`].
pub trait Tab {
    fn context_id(&self) -> ContextId;

    /// Load `url`. Fails with a navigation error on transport failure.
    async fn navigate(&self, url: &str) -> CrawlResult<()>;

    /// Load the current URL again.
    async fn reload(&self) -> CrawlResult<()>;

    async fn current_url(&self) -> CrawlResult<Option<String>>;

    async fn document_title(&self) -> CrawlResult<String>;

    /// Full-document markup. Used for diagnostic snapshots.
    async fn document_outer_html(&self) -> CrawlResult<String>;

    async fn count(&self, locator: &Locator) -> CrawlResult<usize>;

    async fn is_visible(&self, locator: &Locator) -> CrawlResult<bool>;

    async fn text_content(&self, locator: &Locator) -> CrawlResult<Option<String>>;

    async fn inner_text(&self, locator: &Locator) -> CrawlResult<Option<String>>;

    async fn attribute(&self, locator: &Locator, name: &str) -> CrawlResult<Option<String>>;

    async fn click(&self, locator: &Locator) -> CrawlResult<()>;

    async fn pause(&self, duration: Duration);
}

/// A tab that exclusively owns its execution context.
pub trait IsolatedContext: Tab {
    /// Close the context, then fire its close hook.
    async fn close(self) -> CrawlResult<()>;
}

/// Source of isolated execution contexts.
pub trait Browser {
    type Context: IsolatedContext;

    async fn new_isolated_context(&self, hooks: ContextHooks) -> CrawlResult<Self::Context>;
}

/// A located element (or collection of elements) on a tab.
#[derive(Debug)]
pub struct Node<'t, T> {
    tab: &'t T,
    locator: Locator,
}

impl<T> Clone for Node<'_, T> {
    fn clone(&self) -> Self {
        Self {
            tab: self.tab,
            locator: self.locator.clone(),
        }
    }
}

impl<'t, T: Tab> Node<'t, T> {
    pub fn new(tab: &'t T, locator: Locator) -> Self {
        Self { tab, locator }
    }

    pub fn tab(&self) -> &'t T {
        self.tab
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn locate(&self, selector: &str) -> Node<'t, T> {
        Node::new(self.tab, self.locator.find(selector))
    }

    pub fn nth(&self, index: usize) -> Node<'t, T> {
        Node::new(self.tab, self.locator.nth(index))
    }

    pub async fn len(&self) -> CrawlResult<usize> {
        self.tab.count(&self.locator).await
    }

    pub async fn exists(&self) -> CrawlResult<bool> {
        Ok(self.len().await? > 0)
    }

    pub async fn is_visible(&self) -> CrawlResult<bool> {
        self.tab.is_visible(&self.locator).await
    }

    pub async fn text_content(&self) -> CrawlResult<Option<String>> {
        self.tab.text_content(&self.locator).await
    }

    pub async fn inner_text(&self) -> CrawlResult<Option<String>> {
        self.tab.inner_text(&self.locator).await
    }

    pub async fn get_attribute(&self, name: &str) -> CrawlResult<Option<String>> {
        self.tab.attribute(&self.locator, name).await
    }

    pub async fn click(&self) -> CrawlResult<()> {
        self.tab.click(&self.locator).await
    }
}
