//! Activity and weight submissions: the path from an inbound event to XP, skills and streaks.
//!
//! Order inside one unit of work: resolve the user's day, roll every skill over,
//! read the target skill's counter, compute the award, write the log row, credit
//! the skills, advance the streak, commit.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::{resolve_local_day, Clock, LocalDay};
use crate::config::EngineRules;
use crate::errors::AppError;
use crate::models::activity::{ActivityStreak, UserActivity, WeightEntry};
use crate::models::skill::Skill;
use crate::progression::leveling::{apply_xp, daily_xp_by_skill, load_skills_for_today};
use crate::progression::streaks::record_activity;
use crate::progression::xp::{
    compute_xp, weight_tracking_xp, workout_volume, ActivityKind, ActivityMetrics,
};
use crate::store::Store;

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityRequest {
    pub activity_type: String,
    #[serde(flatten)]
    pub metrics: ActivityMetrics,
    #[serde(default)]
    pub notes: Option<String>,
    /// Defaults to the user's today.
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct ActivityOutcome {
    pub activity: UserActivity,
    pub xp_awarded: i32,
    pub skills: Vec<Skill>,
    pub streak: ActivityStreak,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeightRequest {
    pub weight: f64,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub weight_goal: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct WeightOutcome {
    pub entry: WeightEntry,
    pub xp_awarded: i32,
    pub skill: Option<Skill>,
    pub streak: ActivityStreak,
}

/// Resolves the date an activity is filed under.
///
/// Future dates are rejected. Yesterday is open to admins and, when enabled, to
/// everyone. Anything older is admin-only backfill.
pub fn resolve_activity_date(
    requested: Option<NaiveDate>,
    day: &LocalDay,
    rules: &EngineRules,
    logged_by_admin: bool,
) -> Result<NaiveDate, AppError> {
    let Some(date) = requested else {
        return Ok(day.today);
    };
    if date > day.today {
        return Err(AppError::Validation(format!(
            "Activity date {date} is in the future"
        )));
    }
    if date == day.today || logged_by_admin {
        return Ok(date);
    }
    if date == day.yesterday() && rules.allow_previous_day_logging {
        return Ok(date);
    }
    Err(AppError::Validation(format!(
        "Activity date {date} is outside the allowed logging window"
    )))
}

/// One session cannot outlast the day it is filed under.
const MAX_DURATION_MINUTES: i32 = 24 * 60;
const MAX_DISTANCE_KM: f64 = 1_000.0;
const MAX_SET_WEIGHT: f64 = 1_000.0;
const MAX_SET_REPS: i32 = 1_000;
const MAX_SETS: usize = 200;
const MAX_BODY_WEIGHT: f64 = 1_000.0;

fn validate_metrics(metrics: &ActivityMetrics) -> Result<(), AppError> {
    if !(0..=MAX_DURATION_MINUTES).contains(&metrics.duration) {
        return Err(AppError::Validation(format!(
            "duration must be between 0 and {MAX_DURATION_MINUTES} minutes"
        )));
    }
    if !metrics.distance.is_finite() || !(0.0..=MAX_DISTANCE_KM).contains(&metrics.distance) {
        return Err(AppError::Validation(format!(
            "distance must be between 0 and {MAX_DISTANCE_KM} km"
        )));
    }
    if metrics.sets.len() > MAX_SETS {
        return Err(AppError::Validation(format!(
            "a workout holds at most {MAX_SETS} sets"
        )));
    }
    if metrics.sets.iter().any(|s| {
        !(0..=MAX_SET_REPS).contains(&s.reps)
            || !s.weight.is_finite()
            || !(0.0..=MAX_SET_WEIGHT).contains(&s.weight)
    }) {
        return Err(AppError::Validation(format!(
            "workout sets need reps in 0..={MAX_SET_REPS} and weight in 0..={MAX_SET_WEIGHT}"
        )));
    }
    Ok(())
}

pub async fn log_activity(
    store: &dyn Store,
    clock: &dyn Clock,
    rules: &EngineRules,
    user_id: Uuid,
    request: ActivityRequest,
    logged_by_admin: bool,
) -> Result<ActivityOutcome, AppError> {
    if request.activity_type.trim().is_empty() {
        return Err(AppError::Validation(
            "activity_type cannot be empty".to_string(),
        ));
    }
    validate_metrics(&request.metrics)?;
    let mut uow = store.begin().await?;
    let day = resolve_local_day(uow.as_mut(), clock, user_id).await?;
    let date = resolve_activity_date(request.date, &day, rules, logged_by_admin)?;

    // Counters are read once, before any XP of this request lands.
    let skills = load_skills_for_today(uow.as_mut(), user_id, &day).await?;
    let daily = daily_xp_by_skill(&skills);

    let kind = ActivityKind::parse(&request.activity_type);
    let xp = match kind {
        Some(kind) => {
            let already = daily.get(&kind.primary_skill()).copied().unwrap_or(0);
            compute_xp(kind, &request.metrics, already)
        }
        None => {
            debug!(
                "No XP rule for activity type '{}'",
                request.activity_type
            );
            0
        }
    };

    let activity = UserActivity {
        id: Uuid::new_v4(),
        user_id,
        activity_type: request.activity_type.clone(),
        description: request.metrics.description.clone(),
        notes: request.notes.clone(),
        duration: request.metrics.duration,
        distance: request.metrics.distance,
        volume: workout_volume(&request.metrics.sets).round() as i32,
        xp_earned: xp,
        date,
        logged_by_admin,
        created_at: day.now,
    };
    uow.insert_activity(&activity).await?;

    let mut credited = Vec::new();
    if let Some(kind) = kind {
        let targets = std::iter::once(kind.primary_skill()).chain(kind.bonus_skills().iter().copied());
        for name in targets {
            if let Some(skill) = apply_xp(uow.as_mut(), user_id, name, xp, &day).await? {
                credited.push(skill);
            }
        }
    }

    let streak = record_activity(uow.as_mut(), user_id, &request.activity_type, date).await?;
    uow.commit().await?;

    info!(
        "User {user_id} logged {} on {date} for {xp} XP",
        request.activity_type
    );
    Ok(ActivityOutcome {
        activity,
        xp_awarded: xp,
        skills: credited,
        streak,
    })
}

pub async fn log_weight(
    store: &dyn Store,
    clock: &dyn Clock,
    rules: &EngineRules,
    user_id: Uuid,
    request: WeightRequest,
    logged_by_admin: bool,
) -> Result<WeightOutcome, AppError> {
    if !request.weight.is_finite() || request.weight <= 0.0 || request.weight > MAX_BODY_WEIGHT {
        return Err(AppError::Validation(format!(
            "weight must be positive and at most {MAX_BODY_WEIGHT}"
        )));
    }
    if request
        .weight_goal
        .is_some_and(|g| !g.is_finite() || g <= 0.0 || g > MAX_BODY_WEIGHT)
    {
        return Err(AppError::Validation(format!(
            "weight_goal must be positive and at most {MAX_BODY_WEIGHT}"
        )));
    }
    let mut uow = store.begin().await?;
    let day = resolve_local_day(uow.as_mut(), clock, user_id).await?;
    let date = resolve_activity_date(request.date, &day, rules, logged_by_admin)?;

    let mut history = uow.weight_entries(user_id).await?;
    let weight_goal = request.weight_goal.or_else(|| {
        history
            .iter()
            .filter(|e| e.date <= date)
            .max_by_key(|e| e.date)
            .and_then(|e| e.weight_goal)
    });
    let is_starting_weight = history.iter().all(|e| date < e.date);
    if is_starting_weight {
        for previous in history.iter_mut().filter(|e| e.is_starting_weight) {
            previous.is_starting_weight = false;
            uow.save_weight_entry(previous).await?;
        }
    }

    let entry = WeightEntry {
        id: Uuid::new_v4(),
        user_id,
        weight: request.weight,
        date,
        weight_goal,
        is_starting_weight,
        logged_by_admin,
        created_at: day.now,
    };
    uow.insert_weight_entry(&entry).await?;
    history.push(entry.clone());

    let starting_weight = history
        .iter()
        .min_by_key(|e| e.date)
        .map_or(entry.weight, |e| e.weight);
    let logs: Vec<(NaiveDate, f64)> = history.iter().map(|e| (e.date, e.weight)).collect();
    let xp = weight_tracking_xp(&logs, starting_weight, weight_goal, day.today);

    let kind = ActivityKind::WeightTracking;
    let skill = apply_xp(uow.as_mut(), user_id, kind.primary_skill(), xp, &day).await?;
    let streak = record_activity(uow.as_mut(), user_id, kind.as_str(), date).await?;
    uow.commit().await?;

    info!("User {user_id} logged weight {} on {date} for {xp} XP", entry.weight);
    Ok(WeightOutcome {
        entry,
        xp_awarded: xp,
        skill,
        streak,
    })
}
