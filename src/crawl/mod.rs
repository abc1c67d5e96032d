//! Crawl orchestration.
//!
//! A [`Crawler`] drains a queue of [`CrawlUnit`]s. Every unit runs in its own
//! isolated execution context, which is closed on every exit path before the
//! unit counts as done. Units discovered mid-crawl (a league's teams, a
//! team's players) are appended to the queue, and the crawl ends when the
//! queue is empty with nothing in flight, or when the failure recorder asks
//! for an abort.
//!
//! With `crawl.concurrency > 1`, that many workers pull from the same queue
//! on the current task. Queue access, sink writes and failure recording are
//! each serialized behind their own mutex.

pub mod unit;

use crate::browser::{Browser, IsolatedContext, Locator, Node, Tab};
use crate::config::CrawlConfig;
use crate::error::{CrawlError, CrawlResult};
use crate::extract::composite::{
    extract_career_table, extract_game_box_score, extract_latest_season_url, extract_linescores,
    extract_roster_links, extract_team_links,
};
use crate::extract::fields::visible_text;
use crate::extract::selectors::{
    BOX_SCORE_TAB, CAREER_HEADERS, CAREER_ROWS, CAREER_TABLE, CONSENT_BUTTON, LINESCORE_ROWS, PAGE_HEADING,
    TEAM_SECTIONS,
};
use crate::models::{GameStats, Player, Team};
use crate::outputs::sink::ResultSink;
use crate::recorder::{ArtifactCleaner, Decision, FailureRecord, FailureRecorder};
use crate::sync::{wait_for, wait_optional, WaitOptions};
use futures::future::join_all;
use rand::{rng, Rng};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, instrument, warn};
use unit::{CrawlUnit, UnitKind};

/// Outcome of a whole crawl.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlReport {
    pub completed: usize,
    pub failed: usize,
    /// Units skipped because the same unit was already completed or in
    /// flight.
    pub skipped: usize,
    pub aborted: bool,
    pub failures: Vec<FailureRecord>,
}

impl CrawlReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.aborted
    }
}

/// What one unit produced.
#[derive(Debug)]
enum UnitOutput {
    /// `(name, url)` of every team on the league index.
    TeamIndex(Vec<(String, String)>),
    Roster(Team),
    Career { player: Player, team_url: Option<String> },
    Game { game: GameStats, url: String },
    /// The page loaded but held no valid record.
    Dropped,
}

#[derive(Debug, Default)]
struct WorkState {
    queue: VecDeque<CrawlUnit>,
    /// Keys of the units currently being processed.
    active: HashSet<String>,
    in_flight: usize,
    started: usize,
}

pub struct Crawler<B> {
    browser: B,
    config: CrawlConfig,
    sink: Mutex<ResultSink>,
    recorder: Mutex<FailureRecorder>,
    cleaner: ArtifactCleaner,
    work: Mutex<WorkState>,
    wake: Notify,
    aborted: AtomicBool,
    next_id: AtomicU64,
    completed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

impl<B: Browser> Crawler<B> {
    pub fn new(browser: B, config: CrawlConfig) -> Self {
        let sink = ResultSink::new(config.output.sink_mode, config.output.dir.clone());
        let recorder = FailureRecorder::new(config.output.snapshot_dir.clone(), &config.recorder);
        let cleaner = recorder.cleaner();
        Self {
            browser,
            config,
            sink: Mutex::new(sink),
            recorder: Mutex::new(recorder),
            cleaner,
            work: Mutex::new(WorkState::default()),
            wake: Notify::new(),
            aborted: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        }
    }

    #[cfg(test)]
    pub fn browser(&self) -> &B {
        &self.browser
    }

    #[cfg(test)]
    pub fn cleaner(&self) -> &ArtifactCleaner {
        &self.cleaner
    }

    /// Hand the sink back once the crawl is over, for `finish()`.
    pub fn into_sink(self) -> ResultSink {
        self.sink.into_inner()
    }

    /// Crawl `seeds` and everything discovered from them.
    #[instrument(level = "info", skip_all, fields(seeds = seeds.len(), workers = self.config.crawl.concurrency))]
    pub async fn run(&self, seeds: Vec<UnitKind>) -> CrawlReport {
        self.enqueue(seeds).await;

        let workers = (0..self.config.crawl.concurrency.max(1)).map(|worker| self.worker(worker));
        join_all(workers).await;

        let failures = self.recorder.lock().await.failures().to_vec();
        let report = CrawlReport {
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            aborted: self.aborted.load(Ordering::SeqCst),
            failures,
        };
        info!(
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            aborted = report.aborted,
            remaining = self.sink.lock().await.remaining(),
            artifacts_removed = self.cleaner.removed(),
            "Crawl finished"
        );
        report
    }

    #[instrument(level = "debug", skip(self))]
    async fn worker(&self, worker: usize) {
        while let Some(unit) = self.next_unit().await {
            let key = unit.kind.key();
            let discovered = self.process(unit).await;
            self.finish_unit(&key, discovered).await;
        }
        debug!("Worker idle; queue drained");
    }

    /// Next unit to run, or `None` once the crawl is over for this worker.
    async fn next_unit(&self) -> Option<CrawlUnit> {
        loop {
            let notified = {
                let mut work = self.work.lock().await;
                if self.aborted.load(Ordering::SeqCst) {
                    return None;
                }
                if let Some(limit) = self.config.crawl.max_units {
                    if work.started >= limit {
                        if !work.queue.is_empty() {
                            info!(limit, queued = work.queue.len(), "Unit limit reached");
                            work.queue.clear();
                        }
                        return None;
                    }
                }
                if let Some(unit) = work.queue.pop_front() {
                    if !work.active.insert(unit.kind.key()) {
                        debug!(%unit, "Same unit already in flight; skipping");
                        self.skipped.fetch_add(1, Ordering::SeqCst);
                        continue;
                    }
                    work.in_flight += 1;
                    work.started += 1;
                    return Some(unit);
                }
                if work.in_flight == 0 {
                    return None;
                }
                // Created under the lock so a wake-up sent after we release
                // it is not lost.
                self.wake.notified()
            };
            notified.await;
        }
    }

    async fn finish_unit(&self, key: &str, discovered: Vec<UnitKind>) {
        self.enqueue(discovered).await;
        {
            let mut work = self.work.lock().await;
            work.active.remove(key);
            work.in_flight -= 1;
        }
        self.wake.notify_waiters();
    }

    async fn enqueue(&self, kinds: Vec<UnitKind>) {
        if kinds.is_empty() {
            return;
        }
        {
            let mut sink = self.sink.lock().await;
            for kind in &kinds {
                sink.track(&kind.key());
            }
        }
        let mut work = self.work.lock().await;
        for kind in kinds {
            let unit = CrawlUnit::new(self.next_id.fetch_add(1, Ordering::Relaxed), kind);
            debug!(%unit, "Queued unit");
            work.queue.push_back(unit);
        }
    }

    /// Run one unit start to finish and return the units it discovered.
    #[instrument(level = "info", skip_all, fields(unit = %unit))]
    async fn process(&self, mut unit: CrawlUnit) -> Vec<UnitKind> {
        let key = unit.kind.key();
        if self.sink.lock().await.is_completed(&key) {
            info!("Already completed in this process; skipping");
            self.skipped.fetch_add(1, Ordering::SeqCst);
            return Vec::new();
        }
        if let Err(e) = unit.start() {
            warn!(error = %e, "Unit cannot start");
            return Vec::new();
        }

        let context = match self.browser.new_isolated_context(self.cleaner.hooks()).await {
            Ok(context) => context,
            Err(e) => {
                self.fail(&mut unit, &e, "<!-- no execution context -->").await;
                return Vec::new();
            }
        };

        let outcome = match self.run_unit(&context, &unit.kind).await {
            Ok(output) => self.persist(&unit.kind, output).await,
            Err(e) => Err(e),
        };

        let discovered = match outcome {
            Ok(discovered) => {
                if let Err(e) = unit.complete() {
                    warn!(error = %e, "Unexpected unit state");
                }
                self.sink.lock().await.mark_completed(&key);
                self.recorder.lock().await.record_success();
                self.completed.fetch_add(1, Ordering::SeqCst);
                info!(discovered = discovered.len(), "Unit completed");
                discovered
            }
            Err(e) => {
                let snapshot = context
                    .document_outer_html()
                    .await
                    .unwrap_or_else(|snap_err| format!("<!-- snapshot unavailable: {snap_err} -->"));
                self.fail(&mut unit, &e, &snapshot).await;
                Vec::new()
            }
        };

        if let Err(e) = context.close().await {
            warn!(error = %e, "Failed to close execution context");
        }
        discovered
    }

    async fn fail(&self, unit: &mut CrawlUnit, error: &CrawlError, snapshot: &str) {
        if let Err(e) = unit.fail() {
            warn!(error = %e, "Unexpected unit state");
        }
        self.failed.fetch_add(1, Ordering::SeqCst);
        let decision = self.recorder.lock().await.record(unit, error, snapshot).await;
        if decision == Decision::AbortCrawl {
            self.aborted.store(true, Ordering::SeqCst);
            self.wake.notify_waiters();
        }
    }

    async fn run_unit<T: Tab>(&self, tab: &T, kind: &UnitKind) -> CrawlResult<UnitOutput> {
        match kind {
            UnitKind::League { url } => self.crawl_league(tab, url).await,
            UnitKind::Team { url, name } => self.crawl_team(tab, url, name).await,
            UnitKind::Player { url, name, team_url } => self.crawl_player(tab, url, name, team_url.clone()).await,
            UnitKind::Game { url } => self.crawl_game(tab, url).await,
        }
    }

    /// Hand a unit's output to the sink and turn it into follow-up units.
    async fn persist(&self, kind: &UnitKind, output: UnitOutput) -> CrawlResult<Vec<UnitKind>> {
        let mut sink = self.sink.lock().await;
        match output {
            UnitOutput::TeamIndex(teams) => Ok(teams
                .into_iter()
                .map(|(name, url)| UnitKind::Team { url, name })
                .collect()),
            UnitOutput::Roster(team) => {
                sink.persist_team(&team).await?;
                Ok(team
                    .players
                    .iter()
                    .filter_map(|player| {
                        player.url.clone().map(|url| UnitKind::Player {
                            url,
                            name: player.name.clone(),
                            team_url: Some(team.url.clone()),
                        })
                    })
                    .collect())
            }
            UnitOutput::Career { player, team_url } => {
                sink.persist_player(&player, team_url.as_deref()).await?;
                Ok(Vec::new())
            }
            UnitOutput::Game { game, url } => {
                sink.persist_game(&game, &url).await?;
                Ok(Vec::new())
            }
            UnitOutput::Dropped => {
                debug!(url = %kind.url(), "Nothing to persist");
                Ok(Vec::new())
            }
        }
    }

    async fn crawl_league<T: Tab>(&self, tab: &T, url: &str) -> CrawlResult<UnitOutput> {
        self.open_page(tab, url).await?;
        let teams = extract_team_links(tab, &self.config.timeouts).await?;
        Ok(UnitOutput::TeamIndex(teams))
    }

    async fn crawl_team<T: Tab>(&self, tab: &T, url: &str, name: &str) -> CrawlResult<UnitOutput> {
        self.open_page(tab, url).await?;
        let heading = visible_text(&Node::new(tab, Locator::css(PAGE_HEADING))).await?;
        let team_name = if !name.trim().is_empty() {
            name.trim().to_string()
        } else if !heading.is_empty() {
            heading
        } else {
            return Err(CrawlError::missing("team name", PAGE_HEADING));
        };

        let season_url = extract_latest_season_url(tab, &self.config.timeouts).await?;
        self.open_page(tab, &season_url).await?;
        let players = extract_roster_links(tab, &self.config.timeouts).await?;

        let mut team = Team::new(team_name, url);
        team.players = players;
        Ok(UnitOutput::Roster(team))
    }

    async fn crawl_player<T: Tab>(
        &self,
        tab: &T,
        url: &str,
        name: &str,
        team_url: Option<String>,
    ) -> CrawlResult<UnitOutput> {
        self.open_page(tab, url).await?;
        wait_for(
            tab,
            &Locator::css(CAREER_TABLE),
            WaitOptions::present(self.config.timeouts.career_table_ms),
        )
        .await?;
        let annual_stats =
            extract_career_table(tab, &Locator::css(CAREER_HEADERS), &Locator::css(CAREER_ROWS)).await?;

        let name = if name.trim().is_empty() {
            visible_text(&Node::new(tab, Locator::css(PAGE_HEADING))).await?
        } else {
            name.trim().to_string()
        };
        let mut player = Player::new(name, Some(url.to_string()));
        if !player.is_valid() {
            warn!(%url, "Player page without a name; dropping");
            return Ok(UnitOutput::Dropped);
        }
        player.annual_stats = annual_stats;
        Ok(UnitOutput::Career { player, team_url })
    }

    async fn crawl_game<T: Tab>(&self, tab: &T, url: &str) -> CrawlResult<UnitOutput> {
        let timeouts = &self.config.timeouts;
        self.open_page(tab, url).await?;

        let consent = Node::new(tab, Locator::css(CONSENT_BUTTON));
        if wait_optional(tab, consent.locator(), WaitOptions::visible(timeouts.consent_ms)).await? {
            debug!("Dismissing consent dialog");
            consent.click().await?;
        }

        let box_score_tab = Node::new(tab, Locator::css(BOX_SCORE_TAB));
        wait_for(tab, box_score_tab.locator(), WaitOptions::visible(timeouts.box_score_tab_ms)).await?;
        box_score_tab.click().await?;

        let sections = Node::new(tab, Locator::css(TEAM_SECTIONS));
        wait_for(tab, sections.locator(), WaitOptions::visible(timeouts.sections_ms)).await?;

        let linescores =
            if wait_optional(tab, &Locator::css(LINESCORE_ROWS), WaitOptions::present(timeouts.linescore_ms)).await? {
                extract_linescores(tab).await?
            } else {
                warn!("No linescore rendered; scores left empty");
                Vec::new()
            };

        let game = extract_game_box_score(&sections, &linescores, url, timeouts).await?;
        Ok(UnitOutput::Game {
            game,
            url: url.to_string(),
        })
    }

    /// Navigate, then check the title for an error page. An erroring page
    /// gets exactly one reload.
    #[instrument(level = "info", skip(self, tab), fields(ctx = %tab.context_id()))]
    async fn open_page<T: Tab>(&self, tab: &T, url: &str) -> CrawlResult<()> {
        tab.navigate(url).await?;
        let mut title = tab.document_title().await?;

        if let Some(marker) = self.error_marker(&title) {
            warn!(%title, marker, "Page reports an error; reloading once");
            tab.reload().await?;
            title = tab.document_title().await?;
            if let Some(marker) = self.error_marker(&title) {
                return Err(CrawlError::navigation(
                    url,
                    format!("page title `{title}` matches error marker `{marker}` after reload"),
                ));
            }
        }

        info!(%title, "Page loaded");
        self.politeness_pause(tab).await;
        Ok(())
    }

    fn error_marker(&self, title: &str) -> Option<&str> {
        let title = title.to_lowercase();
        self.config
            .crawl
            .error_title_markers
            .iter()
            .map(String::as_str)
            .find(|marker| !marker.is_empty() && title.contains(&marker.to_lowercase()))
    }

    async fn politeness_pause<T: Tab>(&self, tab: &T) {
        let base = self.config.crawl.navigation_delay();
        if base.is_zero() {
            return;
        }
        let jitter_ms: u64 = rng().random_range(0..=250);
        tab.pause(base + Duration::from_millis(jitter_ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::markup::MarkupBrowser;
    use crate::browser::fixture::FixtureSource;
    use crate::browser::source::Frame;
    use crate::browser::Isolation;
    use crate::config::Timeouts;
    use crate::outputs::sink::SinkMode;
    use std::path::Path;

    const LEAGUE: &str = "https://www.basketball-reference.com/teams/";
    const ATL: &str = "https://www.basketball-reference.com/teams/ATL/";
    const ATL_2025: &str = "https://www.basketball-reference.com/teams/ATL/2025.html";
    const TRAE: &str = "https://www.basketball-reference.com/players/y/youngtr01.html";
    const DYSON: &str = "https://www.basketball-reference.com/players/d/daniedy01.html";
    const GAME: &str = "https://www.nba.com/game/atl-vs-chi-1522400055";
    const GAME_2: &str = "https://www.nba.com/game/bos-vs-nyk-1522400056";
    const GAME_3: &str = "https://www.nba.com/game/lal-vs-gsw-1522400057";

    fn config(out: &Path, mode: SinkMode) -> CrawlConfig {
        let mut config = CrawlConfig::default();
        config.crawl.navigation_delay_ms = 0;
        config.output.dir = out.join("out");
        config.output.snapshot_dir = out.join("snapshots");
        config.output.session_dir = out.join("sessions");
        config.output.sink_mode = mode;
        config.timeouts = Timeouts {
            listing_ms: 500,
            season_link_ms: 500,
            roster_ms: 500,
            career_table_ms: 500,
            consent_ms: 200,
            box_score_tab_ms: 500,
            sections_ms: 500,
            linescore_ms: 200,
            team_name_ms: 200,
        };
        config
    }

    fn crawler(source: FixtureSource, config: CrawlConfig) -> Crawler<MarkupBrowser<FixtureSource>> {
        let browser = MarkupBrowser::new(source, config.crawl.isolation, config.output.session_dir.clone());
        Crawler::new(browser, config)
    }

    fn game_page(away: &str, home: &str) -> String {
        let row = |name: &str| {
            let stats: String = (0..20).map(|i| format!("<td>{i}</td>")).collect();
            format!(r#"<tr><td><a href="/player/{0}">{0}</a></td>{stats}</tr>"#, name)
        };
        let section = |team: &str, player: &str| {
            format!(
                r#"<section class="GameBoxscore_gbTableSection__a"><h2>{team}</h2><table>
                    <thead><tr><th>PLAYER</th></tr></thead><tbody>{}</tbody></table></section>"#,
                row(player)
            )
        };
        format!(
            r##"<html><head><title>{away} vs {home} Box Score</title></head><body>
                <button id="onetrust-accept-btn-handler">Accept</button>
                <a id="box-score" href="#box-score">Box Score</a>
                <table class="GameLinescore_table__x"><tbody>
                  <tr><td>A</td><td class="GameLinescore_period__p">30</td><td class="GameLinescore_period__p"></td></tr>
                  <tr><td>H</td><td class="GameLinescore_period__p">28</td><td class="GameLinescore_period__p"></td></tr>
                </tbody></table>
                {}{}
            </body></html>"##,
            section(away, "Away Guard"),
            section(home, "Home Guard")
        )
    }

    /// A game page whose content paints 100ms after load, so the first
    /// worker is still busy with it when the next one looks at the queue.
    fn slow_game(away: &str, home: &str) -> Vec<Frame> {
        vec![
            Frame::immediate("<html><head><title>Loading</title></head><body></body></html>"),
            Frame::after(Duration::from_millis(100), game_page(away, home)),
        ]
    }

    fn snapshots(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir.join("snapshots"))
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn league_source() -> FixtureSource {
        FixtureSource::new()
            .page(
                LEAGUE,
                r#"<title>NBA Teams</title><table id="teams_active"><tbody>
                    <tr><th><a href="/teams/ATL/">Atlanta Hawks</a></th></tr>
                </tbody></table>"#,
            )
            .page(
                ATL,
                r#"<div id="meta"><h1>Atlanta Hawks Franchise Index</h1></div>
                <table><tbody><tr data-row="0"><th><a href="/teams/ATL/2025.html">2024-25</a></th></tr></tbody></table>"#,
            )
            .page(
                ATL_2025,
                r#"<table id="roster"><tbody>
                    <tr><td data-stat="player"><a href="/players/y/youngtr01.html">Trae Young</a></td></tr>
                    <tr><td data-stat="player"><a href="/players/d/daniedy01.html">Dyson Daniels</a></td></tr>
                </tbody></table>"#,
            )
            .page(
                TRAE,
                r#"<div id="meta"><h1>Trae Young</h1></div><table id="per_game">
                    <thead><tr><th>Season</th><th>Age</th><th>G</th></tr></thead>
                    <tbody>
                      <tr><th>2023-24</th><td>25</td><td>54</td></tr>
                      <tr><th>2024-25</th><td>26</td><td>76</td></tr>
                    </tbody></table>"#,
            )
            .page(DYSON, r#"<div id="meta"><h1>Dyson Daniels</h1></div><p>Stats unavailable</p>"#)
    }

    #[tokio::test(start_paused = true)]
    async fn test_league_crawl_nests_careers_under_roster() {
        let dir = tempfile::tempdir().unwrap();
        let crawler = crawler(league_source(), config(dir.path(), SinkMode::Aggregate));

        let report = crawler.run(vec![UnitKind::League { url: LEAGUE.to_string() }]).await;
        assert_eq!(report.completed, 3);
        assert_eq!(report.failed, 1);
        assert!(!report.aborted);
        assert!(!report.is_success());
        assert_eq!(report.failures[0].url, DYSON);
        assert_eq!(report.failures[0].error_kind, "wait_timeout");

        let mut sink = crawler.into_sink();
        sink.finish().await.unwrap();
        let raw = std::fs::read_to_string(dir.path().join("out/teams.json")).unwrap();
        let teams: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(teams[0]["teamName"], "Atlanta Hawks");
        assert_eq!(teams[0]["url"], ATL);
        let players = teams[0]["players"].as_array().unwrap();
        assert_eq!(players.len(), 2);
        assert_eq!(players[0]["annualStats"][1]["G"], "76");
        // The failed career keeps its roster entry, without stats.
        assert_eq!(players[1]["playerName"], "Dyson Daniels");
        assert!(players[1].get("annualStats").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_crawl_writes_box_score() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixtureSource::new().page(GAME, &game_page("Atlanta Hawks", "Chicago Bulls"));
        let crawler = crawler(source, config(dir.path(), SinkMode::Incremental));

        let report = crawler.run(vec![UnitKind::Game { url: GAME.to_string() }]).await;
        assert!(report.is_success());
        assert_eq!(report.completed, 1);

        let raw = std::fs::read_to_string(dir.path().join("out/games/game-atl-vs-chi-1522400055.json")).unwrap();
        let game: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(game["awayTeam"]["teamName"], "Atlanta Hawks");
        assert_eq!(game["homeTeam"]["teamName"], "Chicago Bulls");
        assert_eq!(game["awayTeam"]["scores"], serde_json::json!(["30", null]));
        assert_eq!(game["homeTeam"]["players"][0]["currentSeasonGamesStats"]["PTS"], "18");
        assert!(snapshots(dir.path()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_isolated_and_snapshotted_once() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixtureSource::new()
            .page(GAME, "<html><head><title>Loading</title></head><body><p>spinner</p></body></html>")
            .page(GAME_2, &game_page("Boston Celtics", "New York Knicks"));
        let crawler = crawler(source, config(dir.path(), SinkMode::Incremental));

        let report = crawler
            .run(vec![
                UnitKind::Game { url: GAME.to_string() },
                UnitKind::Game { url: GAME_2.to_string() },
            ])
            .await;

        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        assert!(!report.aborted);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].error_kind, "wait_timeout");

        let snaps = snapshots(dir.path());
        assert_eq!(snaps.len(), 1);
        assert!(snaps[0].starts_with("failed-game-game-atl-vs-chi-1522400055-"));
        let snapshot = std::fs::read_to_string(dir.path().join("snapshots").join(&snaps[0])).unwrap();
        assert!(snapshot.contains("spinner"));
        assert!(dir.path().join("out/games/game-bos-vs-nyk-1522400056.json").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_league_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixtureSource::new().unreachable(LEAGUE, "connection refused");
        let crawler = crawler(source, config(dir.path(), SinkMode::Incremental));

        let report = crawler.run(vec![UnitKind::League { url: LEAGUE.to_string() }]).await;
        assert!(report.aborted);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].error_kind, "navigation");
        assert_eq!(snapshots(dir.path()).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_title_gets_one_reload() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixtureSource::new()
            .page(GAME, "<title>429 Too Many Requests</title>")
            .page(GAME, &game_page("Atlanta Hawks", "Chicago Bulls"))
            .page(GAME_2, "<title>Page Not Found</title>");
        let crawler = crawler(source, config(dir.path(), SinkMode::Incremental));

        let report = crawler
            .run(vec![
                UnitKind::Game { url: GAME.to_string() },
                UnitKind::Game { url: GAME_2.to_string() },
            ])
            .await;

        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(crawler.browser().source().fetch_count(GAME), 2);
        assert_eq!(crawler.browser().source().fetch_count(GAME_2), 2);
        assert_eq!(report.failures[0].url, GAME_2);
        assert_eq!(report.failures[0].error_kind, "navigation");
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_guard_skips_completed_unit() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixtureSource::new().page(GAME, &game_page("Atlanta Hawks", "Chicago Bulls"));
        let crawler = crawler(source, config(dir.path(), SinkMode::Incremental));
        let seed = || UnitKind::Game { url: GAME.to_string() };

        let report = crawler.run(vec![seed(), seed()]).await;
        assert_eq!(report.completed, 1);
        assert_eq!(report.skipped, 1);

        // Re-running in the same process does not reprocess it either.
        let report = crawler.run(vec![seed()]).await;
        assert_eq!(report.skipped, 2);
        assert_eq!(crawler.browser().source().fetch_count(GAME), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unit_in_flight_is_not_processed_twice() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), SinkMode::Incremental);
        config.crawl.concurrency = 2;
        let source = FixtureSource::new().frames(GAME, slow_game("Atlanta Hawks", "Chicago Bulls"));
        let crawler = crawler(source, config);
        let seed = || UnitKind::Game { url: GAME.to_string() };

        let report = crawler.run(vec![seed(), seed()]).await;
        assert_eq!(report.completed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(crawler.browser().source().fetch_count(GAME), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregate_mode_does_not_process_in_flight_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), SinkMode::Aggregate);
        config.crawl.concurrency = 2;
        let source = FixtureSource::new()
            .frames(GAME, slow_game("Atlanta Hawks", "Chicago Bulls"))
            .page(GAME_2, &game_page("Boston Celtics", "New York Knicks"));
        let crawler = crawler(source, config);

        let report = crawler
            .run([GAME, GAME, GAME_2].map(|url| UnitKind::Game { url: url.to_string() }).to_vec())
            .await;
        assert_eq!(report.completed, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(crawler.browser().source().fetch_count(GAME), 1);

        let mut sink = crawler.into_sink();
        sink.finish().await.unwrap();
        let raw = std::fs::read_to_string(dir.path().join("out/games.json")).unwrap();
        let games: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(games.as_array().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_artifacts_removed_on_every_exit_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), SinkMode::Incremental);
        config.crawl.isolation = Isolation::Session;
        let source = FixtureSource::new()
            .page(GAME, &game_page("Atlanta Hawks", "Chicago Bulls"))
            .page(GAME_2, "<p>never renders</p>");
        let crawler = crawler(source, config);

        let report = crawler
            .run(vec![
                UnitKind::Game { url: GAME.to_string() },
                UnitKind::Game { url: GAME_2.to_string() },
            ])
            .await;

        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(crawler.cleaner().removed(), 2);
        let leftovers = std::fs::read_dir(dir.path().join("sessions")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_workers_share_the_queue() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), SinkMode::Aggregate);
        config.crawl.concurrency = 2;
        let source = FixtureSource::new()
            .page(GAME, &game_page("Atlanta Hawks", "Chicago Bulls"))
            .page(GAME_2, &game_page("Boston Celtics", "New York Knicks"))
            .page(GAME_3, &game_page("Los Angeles Lakers", "Golden State Warriors"));
        let crawler = crawler(source, config);

        let report = crawler
            .run([GAME, GAME_2, GAME_3].map(|url| UnitKind::Game { url: url.to_string() }).to_vec())
            .await;
        assert_eq!(report.completed, 3);

        let mut sink = crawler.into_sink();
        sink.finish().await.unwrap();
        let raw = std::fs::read_to_string(dir.path().join("out/games.json")).unwrap();
        let games: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(games.as_array().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_units_caps_started_units() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), SinkMode::Incremental);
        config.crawl.max_units = Some(2);
        let source = FixtureSource::new()
            .page(GAME, &game_page("A", "B"))
            .page(GAME_2, &game_page("C", "D"))
            .page(GAME_3, &game_page("E", "F"));
        let crawler = crawler(source, config);

        let report = crawler
            .run([GAME, GAME_2, GAME_3].map(|url| UnitKind::Game { url: url.to_string() }).to_vec())
            .await;
        assert_eq!(report.completed, 2);
        assert_eq!(crawler.browser().source().fetch_count(GAME_3), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_politeness_pause_applies_between_navigations() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), SinkMode::Incremental);
        config.crawl.navigation_delay_ms = 3_000;
        let source = FixtureSource::new().page(GAME, &game_page("A", "B"));
        let crawler = crawler(source, config);

        let started = tokio::time::Instant::now();
        let report = crawler.run(vec![UnitKind::Game { url: GAME.to_string() }]).await;
        assert!(report.is_success());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(3_000));
        assert!(elapsed < Duration::from_millis(4_000));
    }
}
