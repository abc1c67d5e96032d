//! Hand-authored selector contracts and the box-score stat schema.
//!
//! These mirror the current markup of the two sites the crawler reads and are
//! not negotiated at run time. When the markup changes, this file changes.

use crate::models::StatSchema;
use once_cell::sync::Lazy;

pub const TEAMS_INDEX_URL: &str = "https://www.basketball-reference.com/teams/";

// Team index, team page, season roster.
pub const TEAM_LINKS: &str = "#teams_active > tbody > tr > th > a";
pub const LATEST_SEASON_LINK: &str = "tbody > tr[data-row='0'] > th > a";
pub const ROSTER_TABLE: &str = "#roster";
pub const ROSTER_PLAYER_LINKS: &str = "#roster > tbody > tr > td[data-stat='player'] > a";
// Franchise and player pages share the same heading block.
pub const PAGE_HEADING: &str = "#meta h1";

// Player page.
pub const CAREER_TABLE: &str = "#per_game";
pub const CAREER_HEADERS: &str = "#per_game > thead > tr > th";
pub const CAREER_ROWS: &str = "#per_game > tbody > tr";

// Game page.
pub const CONSENT_BUTTON: &str = "#onetrust-accept-btn-handler";
pub const BOX_SCORE_TAB: &str = "#box-score";
pub const TEAM_SECTIONS: &str = r#"section[class^="GameBoxscore_gbTableSection"]"#;
pub const TEAM_NAME: &str = "h2";
pub const SECTION_ROWS: &str = "tr";
pub const PLAYER_NAME: &str = "td:first-child a";
pub const STAT_CELLS: &str = "td:not(:first-child)";
pub const LINESCORE_ROWS: &str = r#"table[class^="GameLinescore_table"] > tbody > tr"#;
pub const PERIOD_CELLS: &str = r#"td[class^="GameLinescore_period"]"#;

/// Box-score columns, in the order the stat cells render.
pub const BOX_SCORE_KEYS: [&str; 20] = [
    "MIN", "FGM", "FGA", "FG%", "3PM", "3PA", "3P%", "FTM", "FTA", "FT%", "OREB", "DREB", "REB",
    "AST", "STL", "BLK", "TO", "PF", "PTS", "+/-",
];

pub static BOX_SCORE_SCHEMA: Lazy<StatSchema> = Lazy::new(|| StatSchema::new(BOX_SCORE_KEYS));
