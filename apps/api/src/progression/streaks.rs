use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::activity::ActivityStreak;
use crate::store::{Store, UnitOfWork};

/// Next state of a streak row given a log on `date`.
///
/// `last_activity_date` only ever moves forward: a backfill at or before the
/// stored date leaves the row untouched.
pub fn advance_streak(current: Option<&ActivityStreak>, date: NaiveDate) -> StreakChange {
    let Some(streak) = current else {
        return StreakChange::Started;
    };
    let gap = (date - streak.last_activity_date).num_days();
    match gap {
        i64::MIN..=0 => StreakChange::Unchanged,
        1 => StreakChange::Extended,
        _ => StreakChange::Reset,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakChange {
    Started,
    Extended,
    Reset,
    Unchanged,
}

/// `recordActivity`: updates the (user, activity_type) counter for a log on `date`.
pub async fn record_activity(
    uow: &mut dyn UnitOfWork,
    user_id: Uuid,
    activity_type: &str,
    date: NaiveDate,
) -> Result<ActivityStreak, AppError> {
    let existing = uow.streak(user_id, activity_type).await?;
    let change = advance_streak(existing.as_ref(), date);

    let streak = match (existing, change) {
        (Some(streak), StreakChange::Unchanged) => return Ok(streak),
        (Some(mut streak), StreakChange::Extended) => {
            streak.current_streak += 1;
            streak.last_activity_date = date;
            streak
        }
        (Some(mut streak), _) => {
            streak.current_streak = 1;
            streak.last_activity_date = date;
            streak
        }
        (None, _) => ActivityStreak {
            id: Uuid::new_v4(),
            user_id,
            activity_type: activity_type.to_string(),
            current_streak: 1,
            last_activity_date: date,
        },
    };
    debug!(
        "Streak {activity_type} for user {user_id}: {change:?} -> {}",
        streak.current_streak
    );
    uow.save_streak(&streak).await?;
    Ok(streak)
}

/// Every streak row of a user, as stored. Rows are only advanced by logging,
/// so a counter whose last date is before yesterday is stale until the next log.
pub async fn user_streaks(store: &dyn Store, user_id: Uuid) -> Result<Vec<ActivityStreak>, AppError> {
    let mut uow = store.begin().await?;
    if uow.user(user_id).await?.is_none() {
        return Err(AppError::NotFound(format!("User {user_id} not found")));
    }
    Ok(uow.streaks_for_user(user_id).await?)
}
