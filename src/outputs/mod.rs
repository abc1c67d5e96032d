//! Output generation.
//!
//! - [`sink`]: per-unit or aggregate JSON for teams, players and games
//! - [`summary`]: the end-of-run `crawl_summary.json`

pub mod sink;
pub mod summary;
