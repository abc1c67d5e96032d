//! Field extractors: one located sub-tree in, one scalar or flat record out.
//!
//! None of these wait or navigate. Cells are read strictly one after another
//! in DOM order, because every mapping here is positional.

use crate::browser::{Node, Tab};
use crate::error::CrawlResult;
use crate::extract::selectors::{PERIOD_CELLS, PLAYER_NAME, STAT_CELLS, TEAM_NAME};
use crate::models::{StatRow, StatSchema};
use url::Url;

/// Header text of a team section, or empty when the header is missing or
/// hidden. A hidden header is a stale duplicate, never the real one.
pub async fn extract_team_name<T: Tab>(section: &Node<'_, T>) -> CrawlResult<String> {
    visible_text(&section.locate(TEAM_NAME)).await
}

/// Player name of a box-score row. Empty means "skip this row".
pub async fn extract_player_name<T: Tab>(row: &Node<'_, T>) -> CrawlResult<String> {
    visible_text(&row.locate(PLAYER_NAME)).await
}

/// Map the row's stat cells onto `schema` by position.
///
/// Zero cells (header and spacer rows) gives an empty row. Cells beyond the
/// schema are ignored; a short row lacks the trailing keys.
pub async fn extract_stat_row<T: Tab>(row: &Node<'_, T>, schema: &StatSchema) -> CrawlResult<StatRow> {
    let cells = row.locate(STAT_CELLS);
    let count = cells.len().await?.min(schema.len());

    let mut values = Vec::with_capacity(count);
    for i in 0..count {
        let text = cells.nth(i).text_content().await?.unwrap_or_default();
        values.push(text.trim().to_string());
    }
    Ok(StatRow::from_cells(schema.clone(), values))
}

/// Per-period scores of a linescore row; a blank cell is `None`.
pub async fn extract_score_row<T: Tab>(row: &Node<'_, T>) -> CrawlResult<Vec<Option<String>>> {
    let cells = row.locate(PERIOD_CELLS);
    let count = cells.len().await?;

    let mut scores = Vec::with_capacity(count);
    for i in 0..count {
        let text = cells.nth(i).text_content().await?.unwrap_or_default();
        let text = text.trim();
        scores.push((!text.is_empty()).then(|| text.to_string()));
    }
    Ok(scores)
}

/// Absolute target of a link node, resolved against the tab's current URL.
pub async fn extract_link<T: Tab>(link: &Node<'_, T>) -> CrawlResult<Option<String>> {
    let Some(href) = link.get_attribute("href").await? else {
        return Ok(None);
    };
    let href = href.trim();
    if href.is_empty() {
        return Ok(None);
    }
    let resolved = match link.tab().current_url().await? {
        Some(base) => Url::parse(&base)?.join(href)?,
        None => Url::parse(href)?,
    };
    Ok(Some(resolved.to_string()))
}

/// Trimmed rendered text of `node`, or empty when it is absent or hidden.
pub async fn visible_text<T: Tab>(node: &Node<'_, T>) -> CrawlResult<String> {
    if !node.exists().await? || !node.is_visible().await? {
        return Ok(String::new());
    }
    Ok(node
        .inner_text()
        .await?
        .map(|text| text.trim().to_string())
        .unwrap_or_default())
}
