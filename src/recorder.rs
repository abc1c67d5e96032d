//! Failure recording: diagnostic snapshots, structured error logs, and the
//! continue/abort decision.
//!
//! Snapshots are named `failed-<kind>-<slug>-<timestamp>.html` and opened
//! create-new, so they can neither collide with successful output nor
//! overwrite an earlier snapshot. The recorder also owns cleanup of the
//! transient session artifacts that isolated contexts leave behind, through
//! an [`ArtifactCleaner`] wired into each context's close hook.

use crate::browser::{ContextHooks, ContextId};
use crate::config::RecorderSettings;
use crate::crawl::unit::{CrawlUnit, UnitKind};
use crate::error::CrawlError;
use crate::utils::{truncate_for_log, url_slug};
use chrono::Utc;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, instrument, warn};

/// What the orchestrator should do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    ContinueQueue,
    AbortCrawl,
}

/// One failed unit, as reported in the crawl summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub unit: String,
    pub url: String,
    pub error_kind: String,
    pub message: String,
    pub snapshot: Option<PathBuf>,
}

#[derive(Debug)]
pub struct FailureRecorder {
    snapshot_dir: PathBuf,
    max_consecutive_navigation_failures: usize,
    consecutive_navigation_failures: usize,
    failures: Vec<FailureRecord>,
    cleaner: ArtifactCleaner,
}

impl FailureRecorder {
    pub fn new(snapshot_dir: impl Into<PathBuf>, settings: &RecorderSettings) -> Self {
        Self {
            snapshot_dir: snapshot_dir.into(),
            max_consecutive_navigation_failures: settings.max_consecutive_navigation_failures.max(1),
            consecutive_navigation_failures: 0,
            failures: Vec::new(),
            cleaner: ArtifactCleaner::default(),
        }
    }

    pub fn cleaner(&self) -> ArtifactCleaner {
        self.cleaner.clone()
    }

    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// Reset the navigation-failure streak after a unit succeeds.
    pub fn record_success(&mut self) {
        self.consecutive_navigation_failures = 0;
    }

    /// Persist `snapshot`, log the failure, and decide whether the crawl can
    /// go on.
    #[instrument(level = "info", skip_all, fields(unit = %unit, kind = error.kind()))]
    pub async fn record(&mut self, unit: &CrawlUnit, error: &CrawlError, snapshot: &str) -> Decision {
        let snapshot_path = match self.write_snapshot(unit, snapshot).await {
            Ok(path) => Some(path),
            Err(e) => {
                error!(error = %e, dir = %self.snapshot_dir.display(), "Failed to write diagnostic snapshot");
                None
            }
        };

        error!(
            unit_id = unit.id,
            unit_kind = unit.kind.label(),
            url = %unit.kind.url(),
            error_kind = error.kind(),
            error = %truncate_for_log(&error.to_string(), 300),
            snapshot = ?snapshot_path,
            "Crawl unit failed"
        );

        self.failures.push(FailureRecord {
            unit: unit.to_string(),
            url: unit.kind.url().to_string(),
            error_kind: error.kind().to_string(),
            message: error.to_string(),
            snapshot: snapshot_path,
        });

        self.decide(unit, error)
    }

    fn decide(&mut self, unit: &CrawlUnit, error: &CrawlError) -> Decision {
        if !error.is_navigation() {
            self.consecutive_navigation_failures = 0;
            return Decision::ContinueQueue;
        }
        self.consecutive_navigation_failures += 1;

        if matches!(unit.kind, UnitKind::League { .. }) {
            warn!("Top-level listing could not be loaded; aborting crawl");
            return Decision::AbortCrawl;
        }
        if self.consecutive_navigation_failures >= self.max_consecutive_navigation_failures {
            warn!(
                streak = self.consecutive_navigation_failures,
                "Repeated navigation failures; aborting crawl"
            );
            return Decision::AbortCrawl;
        }
        Decision::ContinueQueue
    }

    async fn write_snapshot(&self, unit: &CrawlUnit, snapshot: &str) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.snapshot_dir).await?;
        let stem = format!(
            "failed-{}-{}-{}",
            unit.kind.label(),
            url_slug(unit.kind.url()),
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
        );

        for attempt in 0..1000u32 {
            let name = if attempt == 0 {
                format!("{stem}.html")
            } else {
                format!("{stem}-{attempt}.html")
            };
            let path = self.snapshot_dir.join(name);
            match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(mut file) => {
                    file.write_all(snapshot.as_bytes()).await?;
                    file.flush().await?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free snapshot name for {stem}"),
        ))
    }
}

/// Deletes transient per-context artifacts once their context has closed.
///
/// Cheap to clone; every clone shares the same counter.
#[derive(Debug, Clone, Default)]
pub struct ArtifactCleaner {
    removed: Arc<AtomicUsize>,
}

impl ArtifactCleaner {
    /// Close hooks that route the context's artifact back to this cleaner.
    pub fn hooks(&self) -> ContextHooks {
        let cleaner = self.clone();
        ContextHooks::on_closed(move |id, artifact| cleaner.cleanup(id, artifact.as_deref()))
    }

    pub fn cleanup(&self, id: ContextId, artifact: Option<&Path>) {
        let Some(path) = artifact else {
            return;
        };
        match std::fs::remove_file(path) {
            Ok(()) => {
                self.removed.fetch_add(1, Ordering::Relaxed);
                debug!(ctx = %id, path = %path.display(), "Removed session artifact");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(ctx = %id, path = %path.display(), error = %e, "Failed to remove session artifact"),
        }
    }

    pub fn removed(&self) -> usize {
        self.removed.load(Ordering::Relaxed)
    }
}
