//! Result persistence.
//!
//! Two modes:
//!
//! - [`SinkMode::Incremental`]: one pretty JSON file per completed unit,
//!   written as soon as the unit completes, so a crash loses at most the
//!   units in flight.
//! - [`SinkMode::Aggregate`]: everything kept in memory and written once by
//!   [`ResultSink::finish`].
//!
//! ```text
//! output/
//! ├── teams/atlanta-hawks.json          # incremental
//! ├── players/trae-young-youngtr01.json
//! ├── games/game-atl-vs-chi-1522400055.json
//! ├── teams.json                        # aggregate
//! └── games.json
//! ```
//!
//! The sink also keeps the in-process resume guard: the keys of units still
//! to do and of units already completed.

use crate::error::CrawlResult;
use crate::models::{GameStats, Player, Team};
use crate::utils::{slugify, url_slug, url_tail_slug};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SinkMode {
    /// One file per completed team, player or game.
    #[default]
    Incremental,
    /// One file per record type for the whole crawl.
    Aggregate,
}

impl SinkMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SinkMode::Incremental => "incremental",
            SinkMode::Aggregate => "aggregate",
        }
    }
}

#[derive(Debug)]
pub struct ResultSink {
    mode: SinkMode,
    dir: PathBuf,
    remaining: HashSet<String>,
    completed: HashSet<String>,
    teams: Vec<Team>,
    loose_players: Vec<Player>,
    games: Vec<GameStats>,
    files: Vec<PathBuf>,
}

impl ResultSink {
    pub fn new(mode: SinkMode, dir: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            dir: dir.into(),
            remaining: HashSet::new(),
            completed: HashSet::new(),
            teams: Vec::new(),
            loose_players: Vec::new(),
            games: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn mode(&self) -> SinkMode {
        self.mode
    }

    /// Files written so far.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Note a queued unit as remaining work.
    pub fn track(&mut self, key: &str) {
        if !self.completed.contains(key) {
            self.remaining.insert(key.to_string());
        }
    }

    /// Move a unit from remaining to completed.
    pub fn mark_completed(&mut self, key: &str) {
        self.remaining.remove(key);
        self.completed.insert(key.to_string());
    }

    /// Whether a dequeued unit can be skipped because its output already
    /// exists. Only incremental mode persists per unit, so only it skips.
    pub fn is_completed(&self, key: &str) -> bool {
        self.mode == SinkMode::Incremental && self.completed.contains(key)
    }

    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    #[instrument(level = "info", skip_all, fields(team = %team.team_name))]
    pub async fn persist_team(&mut self, team: &Team) -> CrawlResult<()> {
        match self.mode {
            SinkMode::Incremental => {
                let name = file_stem(&team.team_name, &team.url);
                self.write_unit_file("teams", &name, team).await
            }
            SinkMode::Aggregate => {
                match self.teams.iter_mut().find(|t| t.url == team.url) {
                    Some(existing) => *existing = team.clone(),
                    None => self.teams.push(team.clone()),
                }
                debug!(teams = self.teams.len(), "Buffered team");
                Ok(())
            }
        }
    }

    /// Persist a player. In aggregate mode the player is merged into the
    /// roster entry of the team at `team_url`, when that team is known.
    #[instrument(level = "info", skip_all, fields(player = %player.name))]
    pub async fn persist_player(&mut self, player: &Player, team_url: Option<&str>) -> CrawlResult<()> {
        match self.mode {
            SinkMode::Incremental => {
                let url = player.url.as_deref().unwrap_or_default();
                let name = match url_tail_slug(url) {
                    Some(tail) => format!("{}-{tail}", slugify(&player.name)),
                    None => file_stem(&player.name, url),
                };
                self.write_unit_file("players", &name, player).await
            }
            SinkMode::Aggregate => {
                let team = team_url.and_then(|url| self.teams.iter_mut().find(|t| t.url == url));
                match team {
                    Some(team) => {
                        match team.players.iter_mut().find(|p| p.url.is_some() && p.url == player.url) {
                            Some(entry) => merge_player(entry, player),
                            None => team.players.push(player.clone()),
                        }
                    }
                    None => self.loose_players.push(player.clone()),
                }
                Ok(())
            }
        }
    }

    #[instrument(level = "info", skip_all, fields(%url))]
    pub async fn persist_game(&mut self, game: &GameStats, url: &str) -> CrawlResult<()> {
        match self.mode {
            SinkMode::Incremental => self.write_unit_file("games", &url_slug(url), game).await,
            SinkMode::Aggregate => {
                self.games.push(game.clone());
                Ok(())
            }
        }
    }

    /// Write the aggregate documents. A no-op in incremental mode.
    #[instrument(level = "info", skip_all, fields(mode = self.mode.as_str()))]
    pub async fn finish(&mut self) -> CrawlResult<()> {
        if self.mode == SinkMode::Incremental {
            return Ok(());
        }
        if !self.teams.is_empty() {
            let path = self.dir.join("teams.json");
            write_json(&path, &self.teams).await?;
            self.files.push(path);
        }
        if !self.loose_players.is_empty() {
            let path = self.dir.join("players.json");
            write_json(&path, &self.loose_players).await?;
            self.files.push(path);
        }
        if !self.games.is_empty() {
            let path = self.dir.join("games.json");
            write_json(&path, &self.games).await?;
            self.files.push(path);
        }
        info!(files = self.files.len(), "Wrote aggregate output");
        Ok(())
    }

    async fn write_unit_file<T: Serialize>(&mut self, subdir: &str, name: &str, value: &T) -> CrawlResult<()> {
        let path = self.dir.join(subdir).join(format!("{name}.json"));
        write_json(&path, value).await?;
        info!(path = %path.display(), "Wrote unit output");
        self.files.push(path);
        Ok(())
    }
}

/// Career stats from a player page land on the roster entry discovered
/// earlier; fields the later record lacks are kept.
fn merge_player(entry: &mut Player, player: &Player) {
    if !player.annual_stats.is_empty() {
        entry.annual_stats = player.annual_stats.clone();
    }
    if player.game_stats.is_some() {
        entry.game_stats = player.game_stats.clone();
    }
    if entry.name.trim().is_empty() {
        entry.name = player.name.clone();
    }
}

fn file_stem(name: &str, url: &str) -> String {
    let slug = slugify(name);
    if slug.is_empty() { url_slug(url) } else { slug }
}

pub(crate) async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> CrawlResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StatRow, StatSchema};

    const ATL: &str = "https://www.basketball-reference.com/teams/ATL/";
    const TRAE: &str = "https://www.basketball-reference.com/players/y/youngtr01.html";

    fn roster() -> Team {
        let mut team = Team::new("Atlanta Hawks", ATL);
        team.players.push(Player::new("Trae Young", Some(TRAE.to_string())));
        team
    }

    fn career() -> Player {
        let schema = StatSchema::new(["Season", "G"]);
        let mut player = Player::new("Trae Young", Some(TRAE.to_string()));
        player.annual_stats = vec![StatRow::from_cells(schema, ["2024-25".to_string(), "76".to_string()])];
        player
    }

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_incremental_writes_one_file_per_unit() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ResultSink::new(SinkMode::Incremental, dir.path());

        sink.persist_team(&roster()).await.unwrap();
        sink.persist_player(&career(), Some(ATL)).await.unwrap();

        let team_path = dir.path().join("teams/atlanta-hawks.json");
        let player_path = dir.path().join("players/trae-young-youngtr01.json");
        assert_eq!(read_json(&team_path)["teamName"], "Atlanta Hawks");
        assert_eq!(read_json(&player_path)["annualStats"][0]["G"], "76");
        assert_eq!(sink.files(), &[team_path, player_path]);

        sink.finish().await.unwrap();
        assert!(!dir.path().join("teams.json").exists());
    }

    #[tokio::test]
    async fn test_aggregate_nests_players_under_team() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ResultSink::new(SinkMode::Aggregate, dir.path());

        sink.persist_team(&roster()).await.unwrap();
        sink.persist_player(&career(), Some(ATL)).await.unwrap();
        sink.persist_player(&Player::new("Free Agent", None), None).await.unwrap();
        assert!(sink.files().is_empty());

        sink.finish().await.unwrap();
        let teams = read_json(&dir.path().join("teams.json"));
        assert_eq!(teams.as_array().unwrap().len(), 1);
        let players = teams[0]["players"].as_array().unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0]["playerName"], "Trae Young");
        assert_eq!(players[0]["playerUrl"], TRAE);
        assert_eq!(players[0]["annualStats"][0]["Season"], "2024-25");

        let loose = read_json(&dir.path().join("players.json"));
        assert_eq!(loose[0]["playerName"], "Free Agent");
        assert!(!dir.path().join("games.json").exists());
    }

    #[tokio::test]
    async fn test_games_in_both_modes() {
        let url = "https://www.nba.com/game/atl-vs-chi-1522400055";
        let game = GameStats {
            home_team: Team::new("Chicago Bulls", url),
            away_team: Team::new("Atlanta Hawks", url),
        };

        let dir = tempfile::tempdir().unwrap();
        let mut sink = ResultSink::new(SinkMode::Incremental, dir.path());
        sink.persist_game(&game, url).await.unwrap();
        let written = read_json(&dir.path().join("games/game-atl-vs-chi-1522400055.json"));
        assert_eq!(written["awayTeam"]["teamName"], "Atlanta Hawks");

        let dir = tempfile::tempdir().unwrap();
        let mut sink = ResultSink::new(SinkMode::Aggregate, dir.path());
        sink.persist_game(&game, url).await.unwrap();
        sink.finish().await.unwrap();
        let games = read_json(&dir.path().join("games.json"));
        assert_eq!(games[0]["homeTeam"]["teamName"], "Chicago Bulls");
    }

    #[test]
    fn test_resume_guard_only_in_incremental_mode() {
        let mut sink = ResultSink::new(SinkMode::Incremental, "unused");
        sink.track("team:a");
        sink.track("team:b");
        assert_eq!(sink.remaining(), 2);

        sink.mark_completed("team:a");
        assert_eq!(sink.remaining(), 1);
        assert!(sink.is_completed("team:a"));
        assert!(!sink.is_completed("team:b"));

        // Re-queuing a completed unit does not make it remaining again.
        sink.track("team:a");
        assert_eq!(sink.remaining(), 1);

        let mut sink = ResultSink::new(SinkMode::Aggregate, "unused");
        sink.mark_completed("team:a");
        assert!(!sink.is_completed("team:a"));
    }
}
