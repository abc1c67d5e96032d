//! Markup engine: renders documents from a [`PageSource`] with `scraper`.
//!
//! A tab keeps the parsed live frame and parses again only when a different
//! frame goes live. Nothing parsed is held across an await point, and the
//! cache makes a tab `!Send`. Visibility follows the usual static signals: the
//! `hidden` attribute, `aria-hidden="true"`, and inline `display:none` or
//! `visibility:hidden` on the element or any ancestor.

use super::source::{Frame, PageSource};
use super::{Browser, ContextHooks, ContextId, IsolatedContext, Isolation, Locator, Tab};
use crate::error::{CrawlError, CrawlResult};
use chrono::Utc;
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use url::Url;

static BLANK_DOCUMENT: Lazy<Arc<str>> = Lazy::new(|| Arc::from("<html><head></head><body></body></html>"));

const NOT_RENDERED: &[&str] = &["head", "script", "style", "template", "noscript"];

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "caption", "dd", "div", "dl", "dt",
    "fieldset", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "tfoot",
    "thead", "ul",
];

/// Browser over a [`PageSource`].
#[derive(Debug)]
pub struct MarkupBrowser<S> {
    source: Arc<S>,
    isolation: Isolation,
    session_dir: PathBuf,
    next_id: AtomicU64,
}

impl<S: PageSource> MarkupBrowser<S> {
    pub fn new(source: S, isolation: Isolation, session_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: Arc::new(source),
            isolation,
            session_dir: session_dir.into(),
            next_id: AtomicU64::new(1),
        }
    }

    #[cfg(test)]
    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: PageSource> Browser for MarkupBrowser<S> {
    type Context = MarkupTab<S>;

    #[instrument(level = "debug", skip_all, fields(isolation = ?self.isolation))]
    async fn new_isolated_context(&self, hooks: ContextHooks) -> CrawlResult<MarkupTab<S>> {
        let id = ContextId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let journal = match self.isolation {
            Isolation::Tab => None,
            Isolation::Session => {
                fs::create_dir_all(&self.session_dir).await?;
                let path = self.session_dir.join(format!("{id}.jsonl"));
                fs::File::create(&path).await?;
                Some(path)
            }
        };
        debug!(%id, journal = ?journal, "Opened execution context");

        Ok(MarkupTab {
            id,
            source: Arc::clone(&self.source),
            state: Mutex::new(TabState::default()),
            parsed: RefCell::new(None),
            parses: Cell::new(0),
            journal,
            hooks,
        })
    }
}

#[derive(Debug)]
struct TabState {
    url: Option<Url>,
    frames: Vec<Frame>,
    navigated_at: Instant,
}

impl Default for TabState {
    fn default() -> Self {
        Self {
            url: None,
            frames: Vec::new(),
            navigated_at: Instant::now(),
        }
    }
}

impl TabState {
    /// The latest frame whose delay has elapsed.
    fn live_markup(&self) -> Arc<str> {
        let elapsed = self.navigated_at.elapsed();
        self.frames
            .iter()
            .filter(|frame| frame.delay <= elapsed)
            .max_by_key(|frame| frame.delay)
            .map(|frame| Arc::clone(&frame.markup))
            .unwrap_or_else(|| Arc::clone(&BLANK_DOCUMENT))
    }
}

/// A live frame together with its parsed document.
struct ParsedFrame {
    markup: Arc<str>,
    document: Html,
}

impl fmt::Debug for ParsedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedFrame").field("bytes", &self.markup.len()).finish()
    }
}

/// One isolated execution context of a [`MarkupBrowser`].
#[derive(Debug)]
pub struct MarkupTab<S> {
    id: ContextId,
    source: Arc<S>,
    state: Mutex<TabState>,
    parsed: RefCell<Option<ParsedFrame>>,
    parses: Cell<usize>,
    journal: Option<PathBuf>,
    hooks: ContextHooks,
}

impl<S: PageSource> MarkupTab<S> {
    fn lock_state(&self) -> CrawlResult<std::sync::MutexGuard<'_, TabState>> {
        self.state
            .lock()
            .map_err(|_| CrawlError::navigation(self.id.to_string(), "tab state poisoned"))
    }

    fn current(&self) -> CrawlResult<(Option<Url>, Arc<str>)> {
        let state = self.lock_state()?;
        Ok((state.url.clone(), state.live_markup()))
    }

    /// Run `f` against the live document, parsing it only if the live frame
    /// changed since the last query.
    fn with_document<R>(&self, f: impl FnOnce(&Html) -> CrawlResult<R>) -> CrawlResult<R> {
        let (_, markup) = self.current()?;
        let mut cache = self.parsed.borrow_mut();
        let parsed = match cache.take() {
            Some(parsed) if Arc::ptr_eq(&parsed.markup, &markup) => parsed,
            _ => {
                self.parses.set(self.parses.get() + 1);
                debug!(ctx = %self.id, bytes = markup.len(), parses = self.parses.get(), "Parsing live frame");
                ParsedFrame {
                    document: Html::parse_document(&markup),
                    markup,
                }
            }
        };
        let result = f(&parsed.document);
        *cache = Some(parsed);
        result
    }

    #[cfg(test)]
    fn parse_count(&self) -> usize {
        self.parses.get()
    }

    /// Run `f` against the first element `locator` resolves to, if any.
    fn with_first<R>(
        &self,
        locator: &Locator,
        f: impl FnOnce(ElementRef<'_>) -> R,
    ) -> CrawlResult<Option<R>> {
        self.with_document(|document| {
            let elements = resolve(document, locator)?;
            Ok(elements.into_iter().next().map(f))
        })
    }

    async fn load(&self, url: Url) -> CrawlResult<()> {
        let frames = self.source.fetch(&url).await?;
        {
            let mut state = self.lock_state()?;
            state.url = Some(url.clone());
            state.frames = frames;
            state.navigated_at = Instant::now();
        }
        self.journal_event("navigate", url.as_str()).await;
        Ok(())
    }

    async fn journal_event(&self, event: &str, target: &str) {
        let Some(path) = &self.journal else {
            return;
        };
        let line = serde_json::json!({
            "event": event,
            "target": target,
            "at": Utc::now().to_rfc3339(),
        });
        let written = async {
            let mut file = fs::OpenOptions::new().append(true).open(path).await?;
            file.write_all(format!("{line}\n").as_bytes()).await
        };
        if let Err(e) = written.await {
            warn!(path = %path.display(), error = %e, "Failed to append session journal");
        }
    }
}

impl<S: PageSource> Tab for MarkupTab<S> {
    fn context_id(&self) -> ContextId {
        self.id
    }

    #[instrument(level = "debug", skip(self), fields(ctx = %self.id))]
    async fn navigate(&self, url: &str) -> CrawlResult<()> {
        let parsed = Url::parse(url).map_err(|e| CrawlError::navigation(url, e.to_string()))?;
        self.load(parsed).await
    }

    async fn reload(&self) -> CrawlResult<()> {
        let url = self.lock_state()?.url.clone();
        match url {
            Some(url) => self.load(url).await,
            None => Err(CrawlError::navigation("about:blank", "nothing to reload")),
        }
    }

    async fn current_url(&self) -> CrawlResult<Option<String>> {
        Ok(self.lock_state()?.url.as_ref().map(Url::to_string))
    }

    async fn document_title(&self) -> CrawlResult<String> {
        self.with_document(|document| {
            let title = compile("title")?;
            Ok(document
                .select(&title)
                .next()
                .map(|el| normalize_ws(&el.text().collect::<String>()))
                .unwrap_or_default())
        })
    }

    async fn document_outer_html(&self) -> CrawlResult<String> {
        self.with_document(|document| Ok(document.root_element().html()))
    }

    async fn count(&self, locator: &Locator) -> CrawlResult<usize> {
        self.with_document(|document| Ok(resolve(document, locator)?.len()))
    }

    async fn is_visible(&self, locator: &Locator) -> CrawlResult<bool> {
        Ok(self.with_first(locator, is_visible)?.unwrap_or(false))
    }

    async fn text_content(&self, locator: &Locator) -> CrawlResult<Option<String>> {
        self.with_first(locator, |el| el.text().collect::<String>())
    }

    async fn inner_text(&self, locator: &Locator) -> CrawlResult<Option<String>> {
        self.with_first(locator, inner_text)
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> CrawlResult<Option<String>> {
        Ok(self
            .with_first(locator, |el| el.value().attr(name).map(str::to_string))?
            .flatten())
    }

    #[instrument(level = "debug", skip(self), fields(ctx = %self.id, %locator))]
    async fn click(&self, locator: &Locator) -> CrawlResult<()> {
        let href = self
            .with_first(locator, |el| el.value().attr("href").map(str::to_string))?
            .ok_or_else(|| CrawlError::missing("clickable element", locator.to_string()))?;

        match href.filter(|h| !h.starts_with('#') && !h.starts_with("javascript:")) {
            Some(href) => {
                let base = self.lock_state()?.url.clone();
                let target = match base {
                    Some(base) => base.join(&href)?,
                    None => Url::parse(&href)?,
                };
                self.load(target).await
            }
            None => {
                self.journal_event("click", &locator.to_string()).await;
                Ok(())
            }
        }
    }

    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

impl<S: PageSource> IsolatedContext for MarkupTab<S> {
    async fn close(self) -> CrawlResult<()> {
        debug!(ctx = %self.id, "Closing execution context");
        self.hooks.fire_closed(self.id, self.journal);
        Ok(())
    }
}

fn compile(selector: &str) -> CrawlResult<Selector> {
    Selector::parse(selector).map_err(|e| CrawlError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Resolve every step of `locator`, keeping document order within a step.
fn resolve<'a>(document: &'a Html, locator: &Locator) -> CrawlResult<Vec<ElementRef<'a>>> {
    let mut current: Option<Vec<ElementRef<'a>>> = None;

    for step in locator.steps() {
        let selector = compile(&step.selector)?;
        let mut matched: Vec<ElementRef<'a>> = match current {
            None => document.select(&selector).collect(),
            Some(parents) => parents
                .iter()
                .flat_map(|parent| parent.select(&selector))
                .unique_by(|el| el.id())
                .collect(),
        };
        if let Some(index) = step.index {
            matched = matched.into_iter().nth(index).into_iter().collect();
        }
        current = Some(matched);
    }

    Ok(current.unwrap_or_default())
}

fn is_self_hidden(el: ElementRef<'_>) -> bool {
    let value = el.value();
    if NOT_RENDERED.contains(&value.name()) || value.attr("hidden").is_some() {
        return true;
    }
    if value.attr("aria-hidden") == Some("true") {
        return true;
    }
    value
        .attr("style")
        .map(|style| {
            let style: String = style
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_lowercase();
            style.contains("display:none") || style.contains("visibility:hidden")
        })
        .unwrap_or(false)
}

fn is_visible(el: ElementRef<'_>) -> bool {
    !is_self_hidden(el) && !el.ancestors().filter_map(ElementRef::wrap).any(is_self_hidden)
}

/// Rendered text: hidden sub-trees skipped, table cells tab-separated,
/// block elements on their own lines.
fn inner_text(el: ElementRef<'_>) -> String {
    if !is_visible(el) {
        return String::new();
    }
    let mut out = String::new();
    if el.value().name() == "tr" {
        push_row(el, &mut out);
    } else {
        push_children(el, &mut out);
    }
    tidy(&out)
}

fn push_rendered(el: ElementRef<'_>, out: &mut String) {
    if is_self_hidden(el) {
        return;
    }
    match el.value().name() {
        "br" => out.push('\n'),
        "tr" => {
            break_line(out);
            push_row(el, out);
            break_line(out);
        }
        name if BLOCK_ELEMENTS.contains(&name) => {
            break_line(out);
            push_children(el, out);
            break_line(out);
        }
        _ => push_children(el, out),
    }
}

fn push_row(row: ElementRef<'_>, out: &mut String) {
    let cells = row
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|cell| matches!(cell.value().name(), "td" | "th") && !is_self_hidden(*cell))
        .map(|cell| {
            let mut text = String::new();
            push_children(cell, &mut text);
            tidy(&text)
        })
        .join("\t");
    out.push_str(&cells);
}

fn push_children(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            push_collapsed(text, out);
        } else if let Some(child) = ElementRef::wrap(child) {
            push_rendered(child, out);
        }
    }
}

fn push_collapsed(text: &str, out: &mut String) {
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !out.is_empty() && !out.ends_with(&[' ', '\n', '\t'][..]) {
                out.push(' ');
            }
        } else {
            out.push(ch);
        }
    }
}

fn break_line(out: &mut String) {
    while out.ends_with(' ') {
        out.pop();
    }
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn tidy(text: &str) -> String {
    text.split('\n')
        .map(|line| line.trim_matches(' '))
        .filter(|line| !line.is_empty())
        .join("\n")
}

fn normalize_ws(text: &str) -> String {
    text.split_whitespace().join(" ")
}
