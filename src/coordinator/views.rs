//! Presentation views over a snapshot
//!
//! Each view is a named, keyed projection of the current snapshot that a
//! host adapter can expose as a sensor. Views hold only identifiers and
//! re-read the snapshot on every call.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::models::Snapshot;

/// A value derived from the snapshot
pub trait EntityView: Send + Sync {
    /// Stable key, unique within one entry
    fn key(&self) -> String;

    /// Human-readable name
    fn name(&self) -> String;

    /// Current state
    fn current_value(&self, snapshot: &Snapshot) -> Value;

    /// Extra state attributes
    fn attributes(&self, snapshot: &Snapshot) -> Map<String, Value> {
        let _ = snapshot;
        Map::new()
    }
}

/// Points of one user, read from the leaderboard
#[derive(Debug, Clone)]
pub struct UserPointsView {
    pub user_id: String,
    pub user_name: String,
}

impl EntityView for UserPointsView {
    fn key(&self) -> String {
        format!("user_{}_points", self.user_id)
    }

    fn name(&self) -> String {
        format!("{} Points", self.user_name)
    }

    fn current_value(&self, snapshot: &Snapshot) -> Value {
        let points = snapshot
            .leaderboard
            .users
            .get(&self.user_id)
            .map_or(0, |entry| entry.points);
        json!(points)
    }

    fn attributes(&self, snapshot: &Snapshot) -> Map<String, Value> {
        let entry = snapshot.leaderboard.users.get(&self.user_id).cloned().unwrap_or_default();

        let mut attrs = Map::new();
        attrs.insert("streak".into(), json!(entry.streak));
        attrs.insert("completed_today".into(), json!(entry.completed_today));
        attrs.insert("completed_week".into(), json!(entry.completed_week));
        attrs.insert("rank".into(), json!(entry.rank.unwrap_or(0)));
        attrs.insert("user_name".into(), json!(self.user_name));
        attrs
    }
}

/// Sum of all leaderboard points
#[derive(Debug, Clone, Default)]
pub struct HouseholdPointsView;

impl EntityView for HouseholdPointsView {
    fn key(&self) -> String {
        "household_points".to_string()
    }

    fn name(&self) -> String {
        "Household Total Points".to_string()
    }

    fn current_value(&self, snapshot: &Snapshot) -> Value {
        json!(snapshot.leaderboard.total_points())
    }
}

/// Timestamp a chore was last completed
#[derive(Debug, Clone)]
pub struct ChoreLastCompletedView {
    pub chore_id: String,
    pub chore_title: String,
}

impl EntityView for ChoreLastCompletedView {
    fn key(&self) -> String {
        format!("chore_{}", self.chore_id)
    }

    fn name(&self) -> String {
        format!("Chore: {}", self.chore_title)
    }

    fn current_value(&self, snapshot: &Snapshot) -> Value {
        snapshot
            .chore(&self.chore_id)
            .and_then(|chore| chore.last_completed())
            .map_or(Value::Null, |ts| json!(ts.to_rfc3339()))
    }

    fn attributes(&self, snapshot: &Snapshot) -> Map<String, Value> {
        let Some(chore) = snapshot.chore(&self.chore_id) else {
            return Map::new();
        };

        let mut attrs = Map::new();
        attrs.insert("assigned_to".into(), json!(chore.assigned_to));
        attrs.insert("room".into(), json!(chore.room));
        attrs.insert("frequency".into(), json!(chore.frequency_or_status));
        attrs.insert("difficulty".into(), json!(chore.difficulty));
        attrs.insert("points".into(), json!(chore.points));
        attrs.insert("is_overdue".into(), json!(chore.is_overdue));
        attrs.insert("next_due".into(), json!(chore.next_due));
        attrs
    }
}

/// Whether a chore is overdue
#[derive(Debug, Clone)]
pub struct ChoreOverdueView {
    pub chore_id: String,
    pub display_name: String,
}

impl EntityView for ChoreOverdueView {
    fn key(&self) -> String {
        format!("chore_{}_overdue", self.chore_id)
    }

    fn name(&self) -> String {
        format!("{} Overdue", self.display_name)
    }

    fn current_value(&self, snapshot: &Snapshot) -> Value {
        json!(snapshot.chore(&self.chore_id).is_some_and(|chore| chore.is_overdue))
    }

    fn attributes(&self, snapshot: &Snapshot) -> Map<String, Value> {
        let Some(chore) = snapshot.chore(&self.chore_id) else {
            return Map::new();
        };

        let mut attrs = Map::new();
        attrs.insert("chore_id".into(), json!(chore.id));
        attrs.insert("room".into(), json!(chore.room));
        attrs.insert("assigned_to".into(), json!(chore.assigned_to));
        attrs.insert("next_due".into(), json!(chore.next_due));
        attrs
    }
}

/// One-tap completion of a chore, credited to the default user
///
/// The value is the id of the user a press would credit, or null when the
/// household has no users and a press does nothing.
#[derive(Debug, Clone)]
pub struct ChoreCompleteAction {
    pub chore_id: String,
    pub chore_title: String,
}

impl EntityView for ChoreCompleteAction {
    fn key(&self) -> String {
        format!("chore_{}_complete", self.chore_id)
    }

    fn name(&self) -> String {
        format!("Complete {}", self.chore_title)
    }

    fn current_value(&self, snapshot: &Snapshot) -> Value {
        snapshot
            .default_user()
            .map_or(Value::Null, |user| json!(user.id))
    }

    fn attributes(&self, snapshot: &Snapshot) -> Map<String, Value> {
        let mut attrs = Map::new();
        attrs.insert("chore_id".into(), json!(self.chore_id));
        attrs.insert(
            "credited_user".into(),
            json!(snapshot.default_user().map(|user| &user.name)),
        );
        attrs
    }
}

/// Build the view set for the users and chores present in `snapshot`
pub fn views_for(snapshot: &Snapshot) -> Vec<Box<dyn EntityView>> {
    let mut views: Vec<Box<dyn EntityView>> = Vec::new();

    for user in &snapshot.users {
        views.push(Box::new(UserPointsView {
            user_id: user.id.clone(),
            user_name: user.name.clone(),
        }));
    }

    for chore in &snapshot.chores {
        views.push(Box::new(ChoreLastCompletedView {
            chore_id: chore.id.clone(),
            chore_title: chore.title.clone(),
        }));
        views.push(Box::new(ChoreOverdueView {
            chore_id: chore.id.clone(),
            display_name: chore.display_name(),
        }));
        views.push(Box::new(ChoreCompleteAction {
            chore_id: chore.id.clone(),
            chore_title: chore.title.clone(),
        }));
    }

    views.push(Box::new(HouseholdPointsView));
    views
}

/// Rendered view, as served by the control API
#[derive(Debug, Clone, Serialize)]
pub struct RenderedView {
    pub key: String,
    pub name: String,
    pub value: Value,
    pub attributes: Map<String, Value>,
}

/// Evaluate every view against `snapshot`
pub fn render(snapshot: &Snapshot) -> Vec<RenderedView> {
    views_for(snapshot)
        .iter()
        .map(|view| RenderedView {
            key: view.key(),
            name: view.name(),
            value: view.current_value(snapshot),
            attributes: view.attributes(snapshot),
        })
        .collect()
}
