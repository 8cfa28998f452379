use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// One skill credited on every completed challenge day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetStat {
    pub stat: String,
    #[serde(default)]
    pub xp: i32,
}

/// Admin-managed challenge definition.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Challenge {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub duration_days: i32,
    pub target_stats: Json<Vec<TargetStat>>,
    pub completion_xp_bonus: i32,
    pub badge_id: Option<Uuid>,
    pub activity_type: Option<String>,
    pub is_active: bool,
}

impl Challenge {
    /// XP written to each progress row. Only positive stats are credited, so
    /// only those count towards the total.
    pub fn daily_xp(&self) -> i32 {
        self.target_stats
            .iter()
            .filter(|s| s.xp > 0)
            .fold(0, |total, s| total.saturating_add(s.xp))
    }
}

/// A user's enrollment in a challenge.
///
/// Terminal states are all `is_active = false` with one of `is_completed`,
/// `is_failed` or `quit_date` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserChallenge {
    pub id: Uuid,
    pub user_id: Uuid,
    pub challenge_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_active: bool,
    pub is_completed: bool,
    pub is_failed: bool,
    pub quit_date: Option<NaiveDate>,
    pub completion_date: Option<NaiveDate>,
    pub failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Failed,
    Quit,
}

impl UserChallenge {
    pub fn status(&self) -> EnrollmentStatus {
        if self.is_completed {
            EnrollmentStatus::Completed
        } else if self.is_failed {
            EnrollmentStatus::Failed
        } else if self.quit_date.is_some() || !self.is_active {
            EnrollmentStatus::Quit
        } else {
            EnrollmentStatus::Active
        }
    }
}

/// Append-only record of one completed challenge day.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChallengeProgress {
    pub id: Uuid,
    pub user_challenge_id: Uuid,
    pub completion_date: NaiveDate,
    pub activity_data: Option<Value>,
    pub xp_awarded: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Badge {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub icon_url: Option<String>,
}

/// Award record, at most one per (user, badge).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserBadge {
    pub id: Uuid,
    pub user_id: Uuid,
    pub badge_id: Uuid,
    pub earned_date: DateTime<Utc>,
    pub user_challenge_id: Option<Uuid>,
}

/// Counters for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_users: i64,
    pub total_challenges: i64,
    pub active_challenges: i64,
    pub users_with_active_challenges: i64,
}
