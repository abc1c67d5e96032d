//! Crawl units and their lifecycle.

use crate::error::{CrawlError, CrawlResult};
use std::fmt;

/// What a unit of work is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitKind {
    /// The top-level team index that seeds a league crawl.
    League { url: String },
    /// A franchise page; discovers its latest roster and players.
    Team { url: String, name: String },
    /// A player page; yields the career table.
    Player {
        url: String,
        name: String,
        team_url: Option<String>,
    },
    /// A game page; yields the box score.
    Game { url: String },
}

impl UnitKind {
    pub fn label(&self) -> &'static str {
        match self {
            UnitKind::League { .. } => "league",
            UnitKind::Team { .. } => "team",
            UnitKind::Player { .. } => "player",
            UnitKind::Game { .. } => "game",
        }
    }

    pub fn url(&self) -> &str {
        match self {
            UnitKind::League { url }
            | UnitKind::Team { url, .. }
            | UnitKind::Player { url, .. }
            | UnitKind::Game { url } => url,
        }
    }

    /// Identity used by the sink's resume guard.
    pub fn key(&self) -> String {
        format!("{}:{}", self.label(), self.url())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl UnitState {
    fn can_move_to(self, to: UnitState) -> bool {
        matches!(
            (self, to),
            (UnitState::Pending, UnitState::InProgress)
                | (UnitState::InProgress, UnitState::Completed)
                | (UnitState::InProgress, UnitState::Failed)
        )
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitState::Pending => "pending",
            UnitState::InProgress => "in_progress",
            UnitState::Completed => "completed",
            UnitState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One queued piece of work. Owned by the orchestrator from dequeue to its
/// terminal state.
#[derive(Debug, Clone)]
pub struct CrawlUnit {
    pub id: u64,
    pub kind: UnitKind,
    state: UnitState,
}

impl CrawlUnit {
    pub fn new(id: u64, kind: UnitKind) -> Self {
        Self {
            id,
            kind,
            state: UnitState::Pending,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn start(&mut self) -> CrawlResult<()> {
        self.transition(UnitState::InProgress)
    }

    pub fn complete(&mut self) -> CrawlResult<()> {
        self.transition(UnitState::Completed)
    }

    pub fn fail(&mut self) -> CrawlResult<()> {
        self.transition(UnitState::Failed)
    }

    fn transition(&mut self, to: UnitState) -> CrawlResult<()> {
        if !self.state.can_move_to(to) {
            return Err(CrawlError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        Ok(())
    }
}

impl fmt::Display for CrawlUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} {}", self.kind.label(), self.id, self.kind.url())
    }
}
