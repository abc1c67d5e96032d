//! End-of-run summary, `crawl_summary.json`.

use crate::crawl::CrawlReport;
use crate::error::CrawlResult;
use crate::outputs::sink::{write_json, SinkMode};
use crate::recorder::FailureRecord;
use chrono::{Local, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlSummary<'a> {
    pub local_date: String,
    pub finished_at: String,
    pub mode: &'static str,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub aborted: bool,
    pub files: &'a [PathBuf],
    pub failures: &'a [FailureRecord],
}

impl<'a> CrawlSummary<'a> {
    pub fn new(report: &'a CrawlReport, mode: SinkMode, files: &'a [PathBuf]) -> Self {
        Self {
            local_date: Local::now().date_naive().to_string(),
            finished_at: Utc::now().to_rfc3339(),
            mode: mode.as_str(),
            completed: report.completed,
            failed: report.failed,
            skipped: report.skipped,
            aborted: report.aborted,
            files,
            failures: &report.failures,
        }
    }
}

/// Write `summary` to `<dir>/crawl_summary.json` and return the path.
#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn write_summary(summary: &CrawlSummary<'_>, dir: &Path) -> CrawlResult<PathBuf> {
    let path = dir.join("crawl_summary.json");
    write_json(&path, summary).await?;
    info!(
        path = %path.display(),
        completed = summary.completed,
        failed = summary.failed,
        "Wrote crawl summary"
    );
    Ok(path)
}
