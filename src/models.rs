//! Typed records produced by the extractors.
//!
//! - [`StatSchema`]: ordered stat keys, the source of truth for key set and order
//! - [`StatRow`]: one positional, possibly truncated row of values under a schema
//! - [`Player`], [`Team`], [`GameStats`]: the aggregates written to disk
//!
//! Aggregates serialize with camelCase keys (`teamName`, `playerUrl`,
//! `annualStats`, ...) so the league output keeps the shape downstream
//! consumers already read. A [`StatRow`] serializes as a JSON object whose
//! keys follow schema order.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Ordered stat keys. Cheap to clone; rows share their schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatSchema(Arc<[String]>);

impl StatSchema {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self(keys.into_iter().map(Into::into).collect())
    }

    pub fn keys(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Values for a prefix of a [`StatSchema`].
///
/// Value `i` belongs to `schema[i]`. A row never holds more values than its
/// schema has keys; a row with fewer values simply lacks the trailing keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatRow {
    schema: StatSchema,
    values: Vec<String>,
}

impl StatRow {
    /// Map cells to keys by position, dropping cells beyond the schema.
    pub fn from_cells<I>(schema: StatSchema, cells: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let values = cells.into_iter().take(schema.len()).collect();
        Self { schema, values }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.schema.keys()[..self.values.len()].iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys().zip(self.values.iter().map(String::as_str))
    }
}

#[cfg(test)]
impl StatRow {
    pub fn schema(&self) -> &StatSchema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let i = self.schema.keys().iter().position(|k| k == key)?;
        self.values.get(i).map(String::as_str)
    }
}

impl Serialize for StatRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StatRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = StatRow;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of stat key to string value")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<StatRow, A::Error> {
                let mut keys = Vec::new();
                let mut values = Vec::new();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    keys.push(key);
                    values.push(value);
                }
                Ok(StatRow {
                    schema: StatSchema::new(keys),
                    values,
                })
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    #[serde(rename = "playerName")]
    pub name: String,
    #[serde(rename = "playerUrl", default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// One row per season of the career table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annual_stats: Vec<StatRow>,
    /// Game-level stats, when the player was read from a box score.
    #[serde(rename = "currentSeasonGamesStats", default, skip_serializing_if = "Option::is_none")]
    pub game_stats: Option<StatRow>,
}

impl Player {
    pub fn new(name: impl Into<String>, url: Option<String>) -> Self {
        Self {
            name: name.into(),
            url,
            annual_stats: Vec::new(),
            game_stats: None,
        }
    }

    /// A player without a name is not a player; callers drop it.
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub team_name: String,
    pub url: String,
    pub players: Vec<Player>,
    /// Per-period scores; `None` for a period the page leaves blank.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scores: Vec<Option<String>>,
}

impl Team {
    pub fn new(team_name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            team_name: team_name.into(),
            url: url.into(),
            players: Vec::new(),
            scores: Vec::new(),
        }
    }
}

/// Box score of one game. The first rendered team section is the away team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStats {
    pub home_team: Team,
    pub away_team: Team,
}
