//! # hoop_crawl
//!
//! Crawls basketball statistics out of pages that render their content after
//! load: team rosters, per-player career tables and game box scores.
//!
//! ## Usage
//!
//! ```sh
//! hoop_crawl league
//! hoop_crawl --sink-mode aggregate games https://www.nba.com/game/atl-vs-chi-1522400055
//! ```
//!
//! ## Architecture
//!
//! 1. **Seeding**: the subcommand turns into the first crawl units
//! 2. **Crawling**: each unit runs in its own isolated context; waits are
//!    bounded, failures are snapshotted and the queue keeps draining
//! 3. **Output**: per-unit or aggregate JSON, then `crawl_summary.json`

use clap::Parser;
use std::error::Error;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod browser;
mod cli;
mod config;
mod crawl;
mod error;
mod extract;
mod models;
mod outputs;
mod recorder;
mod sync;
mod utils;

use browser::markup::MarkupBrowser;
use browser::source::HttpSource;
use cli::{Cli, Command};
use config::CrawlConfig;
use crawl::unit::UnitKind;
use crawl::Crawler;
use outputs::summary::{write_summary, CrawlSummary};
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> ExitCode {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, "hoop_crawl failed");
            ExitCode::FAILURE
        }
    }
}

/// Run one crawl. `Ok(false)` means the crawl finished but some unit failed
/// or the crawl aborted.
#[instrument(level = "info", skip_all)]
async fn run(args: Cli) -> Result<bool, Box<dyn Error>> {
    let start_time = std::time::Instant::now();
    info!("hoop_crawl starting up");
    debug!(?args.command, ?args.config, "Parsed CLI arguments");

    let mut config = CrawlConfig::load(args.config.as_deref()).await?;
    config.apply_cli(&args);
    info!(
        output_dir = %config.output.dir.display(),
        sink_mode = config.output.sink_mode.as_str(),
        isolation = ?config.crawl.isolation,
        concurrency = config.crawl.concurrency,
        "Configuration resolved"
    );

    ensure_writable_dir(&config.output.dir).await?;
    ensure_writable_dir(&config.output.snapshot_dir).await?;

    let seeds = seeds(&args.command, &config);
    let source = HttpSource::new(
        &config.http.user_agent,
        Duration::from_millis(config.http.request_timeout_ms),
    )?;
    let browser = MarkupBrowser::new(source, config.crawl.isolation, config.output.session_dir.clone());
    let output_dir = config.output.dir.clone();

    let crawler = Crawler::new(browser, config);
    let report = crawler.run(seeds).await;

    let mut sink = crawler.into_sink();
    sink.finish().await?;
    let summary = CrawlSummary::new(&report, sink.mode(), sink.files());
    write_summary(&summary, &output_dir).await?;

    let elapsed = start_time.elapsed();
    info!(
        elapsed_ms = elapsed.as_millis() as u64,
        elapsed_secs = elapsed.as_secs_f64(),
        completed = report.completed,
        failed = report.failed,
        aborted = report.aborted,
        "Crawl complete"
    );

    Ok(report.is_success())
}

fn seeds(command: &Command, config: &CrawlConfig) -> Vec<UnitKind> {
    match command {
        Command::League { url } => vec![UnitKind::League {
            url: url.clone().unwrap_or_else(|| config.crawl.league_url.clone()),
        }],
        Command::Teams { urls } => urls
            .iter()
            .map(|url| UnitKind::Team {
                url: url.clone(),
                name: String::new(),
            })
            .collect(),
        Command::Players { urls } => urls
            .iter()
            .map(|url| UnitKind::Player {
                url: url.clone(),
                name: String::new(),
                team_url: None,
            })
            .collect(),
        Command::Games { urls } => urls.iter().map(|url| UnitKind::Game { url: url.clone() }).collect(),
    }
}
