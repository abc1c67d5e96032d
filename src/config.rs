//! Crawl configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML file
//! (`--config`), then command-line flags. Every section has serde defaults,
//! so a YAML file only needs the keys it changes:
//!
//! ```yaml
//! crawl:
//!   isolation: session
//!   navigation_delay_ms: 5000
//! timeouts:
//!   listing_ms: 45000
//! output:
//!   sink_mode: aggregate
//! ```

use crate::browser::Isolation;
use crate::cli::Cli;
use crate::extract::selectors::TEAMS_INDEX_URL;
use crate::outputs::sink::SinkMode;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub crawl: CrawlSettings,
    pub timeouts: Timeouts,
    pub output: OutputSettings,
    pub http: HttpSettings,
    pub recorder: RecorderSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    /// Top-level listing that seeds a league crawl.
    pub league_url: String,
    pub isolation: Isolation,
    /// Execution contexts working the queue at once.
    pub concurrency: usize,
    /// Pause between navigations within a unit, before jitter.
    pub navigation_delay_ms: u64,
    /// Stop starting new units after this many.
    pub max_units: Option<usize>,
    /// A document title containing any of these means the page errored.
    pub error_title_markers: Vec<String>,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            league_url: TEAMS_INDEX_URL.to_string(),
            isolation: Isolation::Tab,
            concurrency: 1,
            navigation_delay_ms: 3_000,
            max_units: None,
            error_title_markers: vec![
                "404".to_string(),
                "Page Not Found".to_string(),
                "Too Many Requests".to_string(),
                "Access Denied".to_string(),
            ],
        }
    }
}

impl CrawlSettings {
    pub fn navigation_delay(&self) -> Duration {
        Duration::from_millis(self.navigation_delay_ms)
    }
}

/// Wait bounds, in milliseconds, per awaited element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub listing_ms: u64,
    pub season_link_ms: u64,
    pub roster_ms: u64,
    pub career_table_ms: u64,
    pub consent_ms: u64,
    pub box_score_tab_ms: u64,
    pub sections_ms: u64,
    pub linescore_ms: u64,
    pub team_name_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            listing_ms: 30_000,
            season_link_ms: 5_000,
            roster_ms: 10_000,
            career_table_ms: 10_000,
            consent_ms: 3_000,
            box_score_tab_ms: 10_000,
            sections_ms: 10_000,
            linescore_ms: 10_000,
            team_name_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub snapshot_dir: PathBuf,
    /// Where session isolation keeps its transient journals.
    pub session_dir: PathBuf,
    pub sink_mode: SinkMode,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            snapshot_dir: PathBuf::from("output/snapshots"),
            session_dir: PathBuf::from(".sessions"),
            sink_mode: SinkMode::Incremental,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    pub request_timeout_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: concat!("hoop_crawl/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    /// Back-to-back navigation failures that mean the automation surface is
    /// unusable and the crawl should stop.
    pub max_consecutive_navigation_failures: usize,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            max_consecutive_navigation_failures: 3,
        }
    }
}

impl CrawlConfig {
    /// Defaults, overlaid with the YAML file at `path` if given.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path).await?;
        let config: CrawlConfig = serde_yaml::from_str(&raw)?;
        info!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Command-line flags win over file values.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(dir) = &cli.output_dir {
            self.output.dir = dir.clone();
            if cli.snapshot_dir.is_none() {
                self.output.snapshot_dir = dir.join("snapshots");
            }
        }
        if let Some(dir) = &cli.snapshot_dir {
            self.output.snapshot_dir = dir.clone();
        }
        if let Some(mode) = cli.sink_mode {
            self.output.sink_mode = mode;
        }
        if let Some(isolation) = cli.isolation {
            self.crawl.isolation = isolation;
        }
        if let Some(concurrency) = cli.concurrency {
            self.crawl.concurrency = concurrency;
        }
        if let Some(delay) = cli.delay_ms {
            self.crawl.navigation_delay_ms = delay;
        }
        if let Some(max_units) = cli.max_units {
            self.crawl.max_units = Some(max_units);
        }
        self.crawl.concurrency = self.crawl.concurrency.max(1);
    }
}
