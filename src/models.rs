// Core data structures for the flowhome bridge

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Normalized household chore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Chore {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub points: Option<i64>,
    pub assigned_to: Option<String>, // user name, or id when the name is unknown
    pub frequency_or_status: Option<String>,
    pub difficulty: Option<String>,
    pub room: Option<String>,
    pub next_due: Option<String>,
    pub last_completed_at: Option<String>,
    #[serde(default)]
    pub is_overdue: bool,
}

impl Chore {
    /// Title with the room appended, e.g. `Dishes (Kitchen)`
    pub fn display_name(&self) -> String {
        match &self.room {
            Some(room) => format!("{} ({room})", self.title),
            None => self.title.clone(),
        }
    }

    /// `last_completed_at` as a UTC timestamp; naive values are taken as UTC
    pub fn last_completed(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.last_completed_at.as_deref()?)
    }
}

/// Normalized household member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub streak: i64,
    #[serde(default)]
    pub completed_today: i64,
    #[serde(default)]
    pub completed_week: i64,
    pub rank: Option<i64>,
}

/// Where a leaderboard came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardSource {
    /// Returned by the upstream `/leaderboard` endpoint
    #[default]
    Upstream,
    /// Projected from the user list because the upstream returned none
    Derived,
}

/// Standing of one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LeaderboardEntry {
    pub name: Option<String>,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub streak: i64,
    #[serde(default)]
    pub completed_today: i64,
    #[serde(default)]
    pub completed_week: i64,
    pub rank: Option<i64>,
}

/// Aggregate standings keyed by user id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Leaderboard {
    pub users: BTreeMap<String, LeaderboardEntry>,
    pub source: LeaderboardSource,
}

impl Leaderboard {
    pub fn is_derived(&self) -> bool {
        self.source == LeaderboardSource::Derived
    }

    /// Sum of all users' points
    pub fn total_points(&self) -> i64 {
        self.users.values().map(|entry| entry.points).sum()
    }
}

/// Immutable result of one successful refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub info: Map<String, Value>,
    pub chores: Vec<Chore>,
    pub users: Vec<User>,
    pub leaderboard: Leaderboard,
    pub version: String,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn chore(&self, id: &str) -> Option<&Chore> {
        self.chores.iter().find(|chore| chore.id == id)
    }

    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|user| user.id == id)
    }

    /// Household name reported by `/info`
    pub fn household_name(&self) -> Option<&str> {
        self.info.get("household_name").and_then(Value::as_str)
    }

    /// User credited by one-tap completions: the first listed user
    pub fn default_user(&self) -> Option<&User> {
        self.users.first()
    }
}

/// Name given to webhooks registered without one
pub const DEFAULT_WEBHOOK_NAME: &str = "FlowHome webhook";

/// Persisted metadata of one registered inbound webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookInfo {
    #[serde(default = "default_webhook_name")]
    pub name: String,
    #[serde(default = "default_local_only")]
    pub local_only: bool,
}

impl Default for WebhookInfo {
    fn default() -> Self {
        Self {
            name: default_webhook_name(),
            local_only: default_local_only(),
        }
    }
}

fn default_webhook_name() -> String {
    DEFAULT_WEBHOOK_NAME.to_string()
}

fn default_local_only() -> bool {
    true
}

/// Returned by a successful webhook registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub webhook_id: String,
    pub webhook_url: String,
}

/// RFC 3339, or a naive ISO 8601 timestamp read as UTC
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
