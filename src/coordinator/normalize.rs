//! Payload normalization
//!
//! The upstream has shipped several payload shapes over time (`chore_id` vs
//! `id`, `name` vs `title`, wrapped vs bare lists, numbers as strings). The
//! functions here map any of them onto [`Chore`], [`User`] and
//! [`Leaderboard`]. They are total: every input record yields exactly one
//! output record, with placeholders for missing identity fields.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::models::{Chore, Leaderboard, LeaderboardEntry, LeaderboardSource, User};

// ============================================================================
// Candidate field names, in priority order
// ============================================================================

/// Keys under which a collection may be wrapped
pub const COLLECTION_WRAPPERS: &[&str] = &["data", "items", "results"];

pub const CHORE_ID_FIELDS: &[&str] = &["chore_id", "id", "uuid"];
pub const CHORE_TITLE_FIELDS: &[&str] = &["title", "name", "chore_name"];
pub const CHORE_DESCRIPTION_FIELDS: &[&str] = &["description", "details", "notes"];
pub const CHORE_POINTS_FIELDS: &[&str] = &["points", "point_value", "reward"];
pub const CHORE_ASSIGNEE_FIELDS: &[&str] = &["assigned_to", "assignee", "assigned_user_id"];
pub const CHORE_FREQUENCY_FIELDS: &[&str] = &["frequency", "recurrence", "status"];
pub const CHORE_DIFFICULTY_FIELDS: &[&str] = &["difficulty", "effort"];
pub const CHORE_ROOM_FIELDS: &[&str] = &["room", "location", "area"];
pub const CHORE_NEXT_DUE_FIELDS: &[&str] = &["next_due", "due_at", "due_date", "due"];
pub const CHORE_LAST_COMPLETED_FIELDS: &[&str] =
    &["last_completed_at", "last_completed", "completed_at"];
pub const CHORE_OVERDUE_FIELDS: &[&str] = &["is_overdue", "overdue"];

pub const USER_ID_FIELDS: &[&str] = &["user_id", "id", "member_id", "uuid"];
pub const USER_NAME_FIELDS: &[&str] = &["name", "display_name", "username", "user_name"];
pub const USER_POINTS_FIELDS: &[&str] = &["points", "total_points", "score"];
pub const USER_STREAK_FIELDS: &[&str] = &["streak", "current_streak"];
pub const USER_TODAY_FIELDS: &[&str] = &["completed_today", "today_count"];
pub const USER_WEEK_FIELDS: &[&str] = &["completed_week", "completed_this_week", "week_count"];
pub const USER_RANK_FIELDS: &[&str] = &["rank", "position"];

pub const UNKNOWN_CHORE_TITLE: &str = "Unknown chore";
pub const UNKNOWN_USER_NAME: &str = "Unknown";

// ============================================================================
// Collections
// ============================================================================

/// Normalize a raw `/chores` payload
pub fn normalize_chores(raw: &Value) -> Vec<Chore> {
    records(raw, "chores", CHORE_ID_FIELDS)
        .iter()
        .enumerate()
        .map(|(index, record)| normalize_chore(index, record))
        .collect()
}

/// Normalize a raw `/users` payload
pub fn normalize_users(raw: &Value) -> Vec<User> {
    records(raw, "users", USER_ID_FIELDS)
        .iter()
        .enumerate()
        .map(|(index, record)| normalize_user(index, record))
        .collect()
}

/// Normalize a raw `/leaderboard` payload
///
/// Accepts `{"users": {id: {...}}}`, `{"users": [...]}` or a bare list.
/// Returns `None` when nothing usable is present so the caller can derive
/// standings from the user list instead.
pub fn normalize_leaderboard(raw: &Value) -> Option<Leaderboard> {
    let users = match raw {
        Value::Object(map) => map
            .get("users")
            .or_else(|| map.get("leaderboard"))
            .or_else(|| COLLECTION_WRAPPERS.iter().find_map(|key| map.get(*key)))?,
        Value::Array(_) => raw,
        _ => return None,
    };

    let mut entries = BTreeMap::new();

    match users {
        Value::Object(by_id) => {
            for (id, record) in by_id {
                entries.insert(id.clone(), leaderboard_entry(&as_object(record), None));
            }
        }
        Value::Array(list) => {
            for (index, record) in list.iter().enumerate() {
                let record = as_object(record);
                let id = string_field(&record, USER_ID_FIELDS)
                    .unwrap_or_else(|| placeholder_id(index));
                // List order is the standing when no rank is given.
                let position = i64::try_from(index + 1).ok();
                entries.insert(id, leaderboard_entry(&record, position));
            }
        }
        _ => return None,
    }

    if entries.is_empty() {
        return None;
    }

    Some(Leaderboard {
        users: entries,
        source: LeaderboardSource::Upstream,
    })
}

/// Project normalized users into standings
///
/// Rank is the 1-based position by descending points; ties keep the
/// upstream order.
pub fn derive_leaderboard(users: &[User]) -> Leaderboard {
    let mut ordered: Vec<&User> = users.iter().collect();
    ordered.sort_by(|a, b| b.points.cmp(&a.points));

    let users = ordered
        .into_iter()
        .enumerate()
        .map(|(index, user)| {
            let entry = LeaderboardEntry {
                name: Some(user.name.clone()),
                points: user.points,
                streak: user.streak,
                completed_today: user.completed_today,
                completed_week: user.completed_week,
                rank: i64::try_from(index + 1).ok(),
            };
            (user.id.clone(), entry)
        })
        .collect();

    Leaderboard {
        users,
        source: LeaderboardSource::Derived,
    }
}

// ============================================================================
// Records
// ============================================================================

fn normalize_chore(index: usize, record: &Map<String, Value>) -> Chore {
    Chore {
        id: string_field(record, CHORE_ID_FIELDS).unwrap_or_else(|| placeholder_id(index)),
        title: string_field(record, CHORE_TITLE_FIELDS)
            .unwrap_or_else(|| UNKNOWN_CHORE_TITLE.to_string()),
        description: string_field(record, CHORE_DESCRIPTION_FIELDS),
        points: int_field(record, CHORE_POINTS_FIELDS),
        assigned_to: assignee(record),
        frequency_or_status: string_field(record, CHORE_FREQUENCY_FIELDS),
        difficulty: string_field(record, CHORE_DIFFICULTY_FIELDS),
        room: string_field(record, CHORE_ROOM_FIELDS),
        next_due: string_field(record, CHORE_NEXT_DUE_FIELDS),
        last_completed_at: string_field(record, CHORE_LAST_COMPLETED_FIELDS),
        is_overdue: bool_field(record, CHORE_OVERDUE_FIELDS).unwrap_or(false),
    }
}

fn normalize_user(index: usize, record: &Map<String, Value>) -> User {
    User {
        id: string_field(record, USER_ID_FIELDS).unwrap_or_else(|| placeholder_id(index)),
        name: string_field(record, USER_NAME_FIELDS)
            .unwrap_or_else(|| UNKNOWN_USER_NAME.to_string()),
        points: int_field(record, USER_POINTS_FIELDS).unwrap_or(0),
        streak: int_field(record, USER_STREAK_FIELDS).unwrap_or(0),
        completed_today: int_field(record, USER_TODAY_FIELDS).unwrap_or(0),
        completed_week: int_field(record, USER_WEEK_FIELDS).unwrap_or(0),
        rank: int_field(record, USER_RANK_FIELDS),
    }
}

fn leaderboard_entry(record: &Map<String, Value>, position: Option<i64>) -> LeaderboardEntry {
    LeaderboardEntry {
        name: string_field(record, USER_NAME_FIELDS),
        points: int_field(record, USER_POINTS_FIELDS).unwrap_or(0),
        streak: int_field(record, USER_STREAK_FIELDS).unwrap_or(0),
        completed_today: int_field(record, USER_TODAY_FIELDS).unwrap_or(0),
        completed_week: int_field(record, USER_WEEK_FIELDS).unwrap_or(0),
        rank: int_field(record, USER_RANK_FIELDS).or(position),
    }
}

/// `assigned_to` may be an id, a name, or a nested user object
fn assignee(record: &Map<String, Value>) -> Option<String> {
    CHORE_ASSIGNEE_FIELDS
        .iter()
        .filter_map(|key| record.get(*key))
        .find_map(|value| match value {
            Value::Object(user) => {
                string_field(user, USER_NAME_FIELDS).or_else(|| string_field(user, USER_ID_FIELDS))
            }
            other => coerce_string(other),
        })
}

fn placeholder_id(index: usize) -> String {
    format!("unknown-{index}")
}

/// Unwrap a collection payload into its records
///
/// Besides bare lists and wrapped lists, a map of records keyed by id is
/// accepted; the key becomes the id when the record carries none.
fn records(raw: &Value, wrapper: &str, id_fields: &[&str]) -> Vec<Map<String, Value>> {
    match raw {
        Value::Array(items) => items.iter().map(as_object).collect(),
        Value::Object(map) => {
            let wrapped = std::iter::once(wrapper)
                .chain(COLLECTION_WRAPPERS.iter().copied())
                .find_map(|key| map.get(key));

            if let Some(inner) = wrapped {
                return records(inner, wrapper, id_fields);
            }

            if !map.is_empty() && map.values().all(Value::is_object) {
                return map
                    .iter()
                    .map(|(key, value)| {
                        let mut record = as_object(value);
                        if string_field(&record, id_fields).is_none() {
                            record.insert("id".to_string(), Value::String(key.clone()));
                        }
                        record
                    })
                    .collect();
            }

            tracing::debug!(wrapper, "Unrecognized collection payload, treating as empty");
            Vec::new()
        }
        Value::Null => Vec::new(),
        other => {
            tracing::debug!(wrapper, kind = json_kind(other), "Scalar collection payload");
            Vec::new()
        }
    }
}

fn as_object(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Scalar coercion
// ============================================================================

fn string_field(record: &Map<String, Value>, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .filter_map(|key| record.get(*key))
        .find_map(coerce_string)
}

fn int_field(record: &Map<String, Value>, candidates: &[&str]) -> Option<i64> {
    candidates
        .iter()
        .filter_map(|key| record.get(*key))
        .find_map(coerce_int)
}

fn bool_field(record: &Map<String, Value>, candidates: &[&str]) -> Option<bool> {
    candidates
        .iter()
        .filter_map(|key| record.get(*key))
        .find_map(coerce_bool)
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.round() as i64))
        }
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "on" => Some(true),
            "false" | "0" | "no" | "n" | "off" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
