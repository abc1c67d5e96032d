//! Composite extractors: assemble field extractor output into aggregates.
//!
//! These are where required data is enforced. A team section without a
//! visible name, a missing roster, or anything other than two box-score
//! sections raises; a row without a player name is skipped silently.

use crate::browser::{Locator, Node, Tab};
use crate::config::Timeouts;
use crate::error::{CrawlError, CrawlResult};
use crate::extract::fields::{
    extract_link, extract_player_name, extract_score_row, extract_stat_row, extract_team_name,
};
use crate::extract::selectors::{
    BOX_SCORE_SCHEMA, LATEST_SEASON_LINK, LINESCORE_ROWS, PLAYER_NAME, ROSTER_PLAYER_LINKS,
    ROSTER_TABLE, SECTION_ROWS, TEAM_LINKS, TEAM_NAME,
};
use crate::models::{GameStats, Player, StatRow, StatSchema, Team};
use crate::sync::{wait_for, wait_optional, WaitOptions};
use itertools::Itertools;
use tracing::{debug, info, instrument, warn};

/// Team name plus every named player row of one box-score section.
///
/// The first row is the header row and is never read as a player.
#[instrument(level = "debug", skip_all, fields(section = %section.locator()))]
pub async fn extract_team_roster<T: Tab>(
    section: &Node<'_, T>,
    source_url: &str,
    timeouts: &Timeouts,
) -> CrawlResult<Team> {
    let header = section.locate(TEAM_NAME);
    // The name check below decides; the wait only gives late headers a chance.
    wait_optional(section.tab(), header.locator(), WaitOptions::visible(timeouts.team_name_ms)).await?;

    let team_name = extract_team_name(section).await?;
    if team_name.is_empty() {
        return Err(CrawlError::missing("team name", header.locator().to_string()));
    }

    let rows = section.locate(SECTION_ROWS);
    let row_count = rows.len().await?;
    let mut team = Team::new(team_name, source_url);

    for i in 1..row_count {
        let row = rows.nth(i);
        let name = extract_player_name(&row).await?;
        if name.is_empty() {
            debug!(row = i, "Row without player name; skipping");
            continue;
        }
        let stats = extract_stat_row(&row, &BOX_SCORE_SCHEMA).await?;
        let url = extract_link(&row.locate(PLAYER_NAME)).await?;

        let mut player = Player::new(name, url);
        player.game_stats = Some(stats);
        team.players.push(player);
    }

    debug!(team = %team.team_name, players = team.players.len(), "Extracted team roster");
    Ok(team)
}

/// Linescore rows in render order: away first, home second.
pub async fn extract_linescores<T: Tab>(tab: &T) -> CrawlResult<Vec<Vec<Option<String>>>> {
    let rows = Node::new(tab, Locator::css(LINESCORE_ROWS));
    let count = rows.len().await?;

    let mut linescores = Vec::with_capacity(count);
    for i in 0..count {
        linescores.push(extract_score_row(&rows.nth(i)).await?);
    }
    Ok(linescores)
}

/// Two-team box score from exactly two rendered sections.
///
/// Section 0 is the away team and section 1 the home team, whatever their
/// labels say. `linescores` pairs up the same way.
#[instrument(level = "info", skip_all, fields(%source_url))]
pub async fn extract_game_box_score<T: Tab>(
    sections: &Node<'_, T>,
    linescores: &[Vec<Option<String>>],
    source_url: &str,
    timeouts: &Timeouts,
) -> CrawlResult<GameStats> {
    let found = sections.len().await?;
    if found != 2 {
        return Err(CrawlError::missing(
            format!("two team sections (found {found})"),
            sections.locator().to_string(),
        ));
    }
    if linescores.len() != 2 {
        warn!(rows = linescores.len(), "Expected two linescore rows");
    }

    let mut away_team = extract_team_roster(&sections.nth(0), source_url, timeouts).await?;
    let mut home_team = extract_team_roster(&sections.nth(1), source_url, timeouts).await?;
    away_team.scores = linescores.first().cloned().unwrap_or_default();
    home_team.scores = linescores.get(1).cloned().unwrap_or_default();

    info!(
        away = %away_team.team_name,
        home = %home_team.team_name,
        away_players = away_team.players.len(),
        home_players = home_team.players.len(),
        "Extracted box score"
    );
    Ok(GameStats { home_team, away_team })
}

/// Career table whose schema comes from its own header row.
///
/// Each data row's rendered text is split on tabs and mapped onto the
/// visible header keys by position. Spacer rows and repeated in-body header
/// rows are skipped.
#[instrument(level = "debug", skip_all, fields(%header_locator, %row_locator))]
pub async fn extract_career_table<T: Tab>(
    tab: &T,
    header_locator: &Locator,
    row_locator: &Locator,
) -> CrawlResult<Vec<StatRow>> {
    let header_cells = Node::new(tab, header_locator.clone());
    let header_count = header_cells.len().await?;
    let mut keys = Vec::with_capacity(header_count);
    for i in 0..header_count {
        let cell = header_cells.nth(i);
        // Rendered rows leave hidden cells out, so hidden headers go too.
        if !cell.is_visible().await? {
            debug!(column = i, "Hidden header cell; skipping");
            continue;
        }
        let key = cell.inner_text().await?.unwrap_or_default();
        keys.push(key.trim().to_string());
    }
    let schema = StatSchema::new(keys);
    if schema.is_empty() {
        return Err(CrawlError::missing("career table header", header_locator.to_string()));
    }

    let rows = Node::new(tab, row_locator.clone());
    let row_count = rows.len().await?;
    let mut table = Vec::with_capacity(row_count);
    for i in 0..row_count {
        let row = rows.nth(i);
        let class = row.get_attribute("class").await?.unwrap_or_default();
        if class.split_whitespace().any(|c| c == "thead") {
            continue;
        }
        let text = row.inner_text().await?.unwrap_or_default();
        if text.trim().is_empty() {
            continue;
        }
        let values = text.split('\t').map(|value| value.trim().to_string());
        table.push(StatRow::from_cells(schema.clone(), values));
    }

    debug!(columns = schema.len(), rows = table.len(), "Extracted career table");
    Ok(table)
}

/// `(team name, team url)` for every active franchise on the index page.
#[instrument(level = "info", skip_all)]
pub async fn extract_team_links<T: Tab>(tab: &T, timeouts: &Timeouts) -> CrawlResult<Vec<(String, String)>> {
    let links = Node::new(tab, Locator::css(TEAM_LINKS));
    wait_for(tab, links.locator(), WaitOptions::present(timeouts.listing_ms)).await?;

    let count = links.len().await?;
    let mut teams = Vec::with_capacity(count);
    for i in 0..count {
        let link = links.nth(i);
        let name = link.inner_text().await?.unwrap_or_default().trim().to_string();
        match extract_link(&link).await? {
            Some(url) => teams.push((name, url)),
            None => warn!(index = i, %name, "Team link without href; skipping"),
        }
    }

    let teams: Vec<_> = teams.into_iter().unique_by(|(_, url)| url.clone()).collect();
    info!(count = teams.len(), "Indexed teams");
    Ok(teams)
}

/// URL of the most recent season on a franchise page.
pub async fn extract_latest_season_url<T: Tab>(tab: &T, timeouts: &Timeouts) -> CrawlResult<String> {
    let link = Node::new(tab, Locator::css(LATEST_SEASON_LINK));
    wait_for(tab, link.locator(), WaitOptions::present(timeouts.season_link_ms)).await?;
    extract_link(&link)
        .await?
        .ok_or_else(|| CrawlError::missing("latest season link", LATEST_SEASON_LINK))
}

/// Players (name and profile URL) listed on a season roster page.
#[instrument(level = "info", skip_all)]
pub async fn extract_roster_links<T: Tab>(tab: &T, timeouts: &Timeouts) -> CrawlResult<Vec<Player>> {
    wait_for(tab, &Locator::css(ROSTER_TABLE), WaitOptions::present(timeouts.roster_ms)).await?;

    let links = Node::new(tab, Locator::css(ROSTER_PLAYER_LINKS));
    let count = links.len().await?;
    if count == 0 {
        return Err(CrawlError::missing("roster players", ROSTER_PLAYER_LINKS));
    }

    let mut players = Vec::with_capacity(count);
    for i in 0..count {
        let link = links.nth(i);
        let name = link.inner_text().await?.unwrap_or_default().trim().to_string();
        let player = Player::new(name, extract_link(&link).await?);
        if player.is_valid() {
            players.push(player);
        } else {
            debug!(index = i, "Roster link without a name; skipping");
        }
    }

    let players: Vec<_> = players.into_iter().unique_by(|p| p.url.clone()).collect();
    info!(count = players.len(), "Indexed roster");
    Ok(players)
}
