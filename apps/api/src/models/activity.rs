use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Consecutive-day counter, one row per (user, activity_type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ActivityStreak {
    pub id: Uuid,
    pub user_id: Uuid,
    pub activity_type: String,
    pub current_streak: i32,
    pub last_activity_date: NaiveDate,
}

/// Immutable log record, one per submission.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserActivity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub activity_type: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub duration: i32,
    pub distance: f64,
    pub volume: i32,
    pub xp_earned: i32,
    pub date: NaiveDate,
    pub logged_by_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WeightEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub weight: f64,
    pub date: NaiveDate,
    pub weight_goal: Option<f64>,
    /// Set only on the chronologically-first entry of a user.
    pub is_starting_weight: bool,
    pub logged_by_admin: bool,
    pub created_at: DateTime<Utc>,
}
