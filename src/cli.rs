//! Command-line interface definitions.
//!
//! Global flags override the YAML configuration; the subcommand picks the
//! crawl shape and its seeds. Every global flag can also come from the
//! environment.

use crate::browser::Isolation;
use crate::outputs::sink::SinkMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Crawl rosters, box scores and career tables into JSON.
///
/// # Examples
///
/// ```sh
/// # Whole league, one file per team and per player
/// hoop_crawl league
///
/// # Two box scores into one games.json
/// hoop_crawl --sink-mode aggregate games https://www.nba.com/game/atl-vs-chi-1522400055
///
/// # A single roster, full session isolation, custom output dir
/// hoop_crawl --isolation session -o ./out teams https://www.basketball-reference.com/teams/LAL/
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML configuration file
    #[arg(short, long, env = "HOOP_CRAWL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for extracted JSON
    #[arg(short, long, env = "HOOP_CRAWL_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Directory for diagnostic snapshots of failed units
    #[arg(long, env = "HOOP_CRAWL_SNAPSHOT_DIR")]
    pub snapshot_dir: Option<PathBuf>,

    /// One file per completed unit, or one file for the whole crawl
    #[arg(long, value_enum, env = "HOOP_CRAWL_SINK_MODE")]
    pub sink_mode: Option<SinkMode>,

    /// Fresh tab or fresh full session per crawl unit
    #[arg(long, value_enum, env = "HOOP_CRAWL_ISOLATION")]
    pub isolation: Option<Isolation>,

    /// Crawl units processed at once
    #[arg(long, env = "HOOP_CRAWL_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Pause between navigations, in milliseconds
    #[arg(long, env = "HOOP_CRAWL_DELAY_MS")]
    pub delay_ms: Option<u64>,

    /// Stop after starting this many units
    #[arg(long)]
    pub max_units: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Every active team, its latest roster, and each player's career table
    League {
        /// Team index page to start from
        #[arg(long)]
        url: Option<String>,
    },
    /// Rosters and career tables for the given team pages
    Teams {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Career tables for the given player pages
    Players {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Box scores for the given game pages
    Games {
        #[arg(required = true)]
        urls: Vec<String>,
    },
}
