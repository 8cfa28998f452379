//! Challenge operations, each inside a single unit of work.
//!
//! Every read or mutation of a user's enrollment runs the expiry sweep for that
//! user first, so stale enrollments are failed before anything else sees them.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::challenges::lifecycle::{
    self, current_day, current_streak, evaluate_expiry, in_window, within_grace,
};
use crate::clock::{resolve_local_day, Clock, LocalDay};
use crate::config::EngineRules;
use crate::errors::AppError;
use crate::models::challenge::{
    Badge, Challenge, ChallengeProgress, EnrollmentStatus, SystemStats, UserBadge, UserChallenge,
};
use crate::models::skill::{Skill, SkillName};
use crate::progression::leveling::apply_xp;
use crate::store::{Store, UnitOfWork};

/// How far back the grace-period restore looks through terminal enrollments.
const RESTORE_LOOKBACK: i64 = 10;

#[derive(Debug, Serialize)]
pub struct ActiveChallengeView {
    pub enrollment: UserChallenge,
    pub challenge: Challenge,
    pub current_day: i32,
    pub completed_days: usize,
    pub current_streak: i32,
    pub today_completed: bool,
    pub can_complete_today: bool,
}

/// A terminal enrollment with its derived outcome.
#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub enrollment: UserChallenge,
    pub status: EnrollmentStatus,
}

#[derive(Debug, Serialize)]
pub struct EarnedBadge {
    #[serde(flatten)]
    pub award: UserBadge,
    /// `None` when the badge definition has since been deleted.
    pub badge: Option<Badge>,
}

#[derive(Debug, Serialize)]
pub struct DayCompletion {
    pub progress: ChallengeProgress,
    pub enrollment: UserChallenge,
    pub skills: Vec<Skill>,
    pub badge: Option<UserBadge>,
}

fn no_active_challenge() -> AppError {
    AppError::NotFound("No active challenge found".into())
}

fn already_active() -> AppError {
    AppError::Conflict("User already has an active challenge".into())
}

/// Commits what the sweep staged, then fails with `err`.
/// Only used before the operation itself has written anything.
async fn reject<T>(uow: Box<dyn UnitOfWork>, err: AppError) -> Result<T, AppError> {
    uow.commit().await?;
    Err(err)
}

async fn load_challenge(
    uow: &mut dyn UnitOfWork,
    challenge_id: Uuid,
) -> Result<Challenge, AppError> {
    uow.challenge(challenge_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Challenge {challenge_id} not found")))
}

/// Fails `enrollment` if it is due. Returns whether it was failed.
async fn expire_if_due(
    uow: &mut dyn UnitOfWork,
    enrollment: &mut UserChallenge,
    day: &LocalDay,
) -> Result<bool, AppError> {
    let completed = uow.progress_for(enrollment.id).await?.len();
    let Some(reason) = evaluate_expiry(enrollment, completed, day.today) else {
        return Ok(false);
    };
    lifecycle::mark_failed(enrollment, day.now);
    uow.save_enrollment(enrollment).await?;
    info!(
        "Challenge enrollment {} of user {} failed: {reason:?}",
        enrollment.id, enrollment.user_id
    );
    Ok(true)
}

/// Expiry sweep for one user. Returns the enrollments still active afterwards.
pub async fn sweep_user(
    uow: &mut dyn UnitOfWork,
    user_id: Uuid,
    day: &LocalDay,
) -> Result<Vec<UserChallenge>, AppError> {
    let mut still_active = Vec::new();
    for mut enrollment in uow.active_enrollments(Some(user_id)).await? {
        if !expire_if_due(uow, &mut enrollment, day).await? {
            still_active.push(enrollment);
        }
    }
    Ok(still_active)
}

/// Batch sweep over every active enrollment, each judged on its owner's local day.
/// Returns how many enrollments were failed. Safe to run repeatedly.
pub async fn sweep_all(store: &dyn Store, clock: &dyn Clock) -> Result<usize, AppError> {
    let mut uow = store.begin().await?;
    let now = clock.now();
    let mut days: HashMap<Uuid, LocalDay> = HashMap::new();
    let mut failed = 0;
    for mut enrollment in uow.active_enrollments(None).await? {
        let day = match days.get(&enrollment.user_id).copied() {
            Some(day) => day,
            None => {
                let tz = uow
                    .user(enrollment.user_id)
                    .await?
                    .and_then(|u| u.timezone);
                let day = LocalDay::in_zone(now, tz.as_deref());
                days.insert(enrollment.user_id, day);
                day
            }
        };
        if expire_if_due(uow.as_mut(), &mut enrollment, &day).await? {
            failed += 1;
        }
    }
    uow.commit().await?;
    if failed > 0 {
        info!("Expiry sweep failed {failed} enrollment(s)");
    }
    Ok(failed)
}

/// `getActiveChallenge`: the user's enrollment with derived progress, after sweeping.
pub async fn get_active_challenge(
    store: &dyn Store,
    clock: &dyn Clock,
    user_id: Uuid,
) -> Result<Option<ActiveChallengeView>, AppError> {
    let mut uow = store.begin().await?;
    let day = resolve_local_day(uow.as_mut(), clock, user_id).await?;
    let active = sweep_user(uow.as_mut(), user_id, &day).await?;

    let view = match active.into_iter().next() {
        None => None,
        Some(enrollment) => {
            let challenge = load_challenge(uow.as_mut(), enrollment.challenge_id).await?;
            let dates: Vec<NaiveDate> = uow
                .progress_for(enrollment.id)
                .await?
                .iter()
                .map(|p| p.completion_date)
                .collect();
            let day_no = current_day(&enrollment, challenge.duration_days, day.today);
            let today_completed = dates.contains(&day.today);
            Some(ActiveChallengeView {
                current_day: day_no,
                completed_days: dates.len(),
                current_streak: current_streak(&dates, day.today),
                today_completed,
                can_complete_today: day_no > 0
                    && in_window(&enrollment, day.today)
                    && !today_completed,
                enrollment,
                challenge,
            })
        }
    };
    uow.commit().await?;
    Ok(view)
}

/// `joinChallenge`: starts an enrollment today. One active enrollment per user.
pub async fn join_challenge(
    store: &dyn Store,
    clock: &dyn Clock,
    user_id: Uuid,
    challenge_id: Uuid,
) -> Result<UserChallenge, AppError> {
    let mut uow = store.begin().await?;
    let day = resolve_local_day(uow.as_mut(), clock, user_id).await?;
    if !sweep_user(uow.as_mut(), user_id, &day).await?.is_empty() {
        return reject(uow, already_active()).await;
    }

    let challenge = match load_challenge(uow.as_mut(), challenge_id).await {
        Ok(challenge) => challenge,
        Err(err) => return reject(uow, err).await,
    };
    if !challenge.is_active {
        let err = AppError::Inactive(format!("Challenge '{}' is not active", challenge.title));
        return reject(uow, err).await;
    }
    if challenge.duration_days < 1 {
        let err = AppError::Validation(format!("Challenge '{}' has no days", challenge.title));
        return reject(uow, err).await;
    }

    let enrollment = lifecycle::new_enrollment(user_id, &challenge, day.today, day.now);
    uow.insert_enrollment(&enrollment).await?;
    uow.commit().await?;
    info!(
        "User {user_id} joined '{}' ({} -> {})",
        challenge.title, enrollment.start_date, enrollment.end_date
    );
    Ok(enrollment)
}

/// Writes the progress row for `date`, credits the target skills and settles completion.
async fn complete_day(
    uow: &mut dyn UnitOfWork,
    day: &LocalDay,
    mut enrollment: UserChallenge,
    challenge: &Challenge,
    date: NaiveDate,
    activity_data: Option<serde_json::Value>,
) -> Result<DayCompletion, AppError> {
    let progress = ChallengeProgress {
        id: Uuid::new_v4(),
        user_challenge_id: enrollment.id,
        completion_date: date,
        activity_data,
        xp_awarded: challenge.daily_xp(),
        created_at: day.now,
    };
    uow.insert_progress(&progress).await?;

    let mut skills = Vec::new();
    for stat in challenge.target_stats.iter().filter(|s| s.xp > 0) {
        let Ok(name) = stat.stat.parse::<SkillName>() else {
            warn!(
                "Challenge {} targets unknown skill '{}'",
                challenge.id, stat.stat
            );
            continue;
        };
        if let Some(skill) = apply_xp(uow, enrollment.user_id, name, stat.xp, day).await? {
            skills.push(skill);
        }
    }

    let completed_days = uow.progress_for(enrollment.id).await?.len();
    let mut badge = None;
    if completed_days >= challenge.duration_days.max(1) as usize {
        lifecycle::mark_completed(&mut enrollment, day.today);
        uow.save_enrollment(&enrollment).await?;
        info!(
            "User {} completed challenge '{}'",
            enrollment.user_id, challenge.title
        );
        if challenge.completion_xp_bonus > 0 {
            debug!(
                "Completion bonus of {} XP for '{}' is not credited to any skill",
                challenge.completion_xp_bonus, challenge.title
            );
        }
        badge = award_badge(uow, &enrollment, challenge, day).await?;
    }

    Ok(DayCompletion {
        progress,
        enrollment,
        skills,
        badge,
    })
}

/// Grants the challenge's badge unless the user already holds it.
async fn award_badge(
    uow: &mut dyn UnitOfWork,
    enrollment: &UserChallenge,
    challenge: &Challenge,
    day: &LocalDay,
) -> Result<Option<UserBadge>, AppError> {
    let Some(badge_id) = challenge.badge_id else {
        return Ok(None);
    };
    if uow.user_badge(enrollment.user_id, badge_id).await?.is_some() {
        return Ok(None);
    }
    let award = UserBadge {
        id: Uuid::new_v4(),
        user_id: enrollment.user_id,
        badge_id,
        earned_date: day.now,
        user_challenge_id: Some(enrollment.id),
    };
    uow.insert_user_badge(&award).await?;
    info!("User {} earned badge {badge_id}", enrollment.user_id);
    Ok(Some(award))
}

/// `markDayComplete`: records today for the user's active enrollment.
pub async fn mark_day_complete(
    store: &dyn Store,
    clock: &dyn Clock,
    user_id: Uuid,
    activity_data: Option<serde_json::Value>,
) -> Result<DayCompletion, AppError> {
    let mut uow = store.begin().await?;
    let day = resolve_local_day(uow.as_mut(), clock, user_id).await?;
    let Some(enrollment) = sweep_user(uow.as_mut(), user_id, &day).await?.into_iter().next()
    else {
        return reject(uow, no_active_challenge()).await;
    };

    if !in_window(&enrollment, day.today) {
        let err = AppError::Validation("Cannot mark day complete outside challenge period".into());
        return reject(uow, err).await;
    }
    let already = uow
        .progress_for(enrollment.id)
        .await?
        .iter()
        .any(|p| p.completion_date == day.today);
    if already {
        let err = AppError::AlreadyCompleted("Today is already marked as complete".into());
        return reject(uow, err).await;
    }

    let challenge = load_challenge(uow.as_mut(), enrollment.challenge_id).await?;
    let completion = complete_day(
        uow.as_mut(),
        &day,
        enrollment,
        &challenge,
        day.today,
        activity_data,
    )
    .await?;
    uow.commit().await?;
    Ok(completion)
}

/// `quitChallenge`: gives up the active enrollment. No penalty beyond losing the slot.
pub async fn quit_challenge(
    store: &dyn Store,
    clock: &dyn Clock,
    user_id: Uuid,
) -> Result<UserChallenge, AppError> {
    let mut uow = store.begin().await?;
    let day = resolve_local_day(uow.as_mut(), clock, user_id).await?;
    let Some(mut enrollment) = sweep_user(uow.as_mut(), user_id, &day).await?.into_iter().next()
    else {
        return reject(uow, no_active_challenge()).await;
    };
    lifecycle::mark_quit(&mut enrollment, day.today);
    uow.save_enrollment(&enrollment).await?;
    uow.commit().await?;
    info!("User {user_id} quit enrollment {}", enrollment.id);
    Ok(enrollment)
}

/// Grace-period restore: revives a recently failed enrollment by completing yesterday.
pub async fn restore_challenge(
    store: &dyn Store,
    clock: &dyn Clock,
    rules: &EngineRules,
    user_id: Uuid,
    activity_data: Option<serde_json::Value>,
) -> Result<DayCompletion, AppError> {
    if !rules.allow_challenge_grace_period {
        return Err(AppError::Validation(
            "Challenge grace period is disabled".into(),
        ));
    }
    let mut uow = store.begin().await?;
    let day = resolve_local_day(uow.as_mut(), clock, user_id).await?;
    if !sweep_user(uow.as_mut(), user_id, &day).await?.is_empty() {
        return reject(uow, already_active()).await;
    }

    let candidate = uow
        .enrollment_history(user_id, 0, RESTORE_LOOKBACK)
        .await?
        .into_iter()
        .filter(|e| within_grace(e, day.now, rules.grace_period_hours))
        .max_by_key(|e| e.failed_at);
    let Some(mut enrollment) = candidate else {
        let err = AppError::NotFound("No recently failed challenge to restore".into());
        return reject(uow, err).await;
    };

    let challenge = load_challenge(uow.as_mut(), enrollment.challenge_id).await?;
    let missed = day.yesterday();
    if !in_window(&enrollment, missed) {
        let err = AppError::Validation("Yesterday is outside the challenge period".into());
        return reject(uow, err).await;
    }
    let completed = uow.progress_for(enrollment.id).await?;
    if completed.iter().any(|p| p.completion_date == missed) {
        let err = AppError::Validation(
            "Yesterday is already complete; an earlier day was missed".into(),
        );
        return reject(uow, err).await;
    }
    let required = if day.today > enrollment.end_date {
        i64::from(challenge.duration_days)
    } else {
        (day.today - enrollment.start_date).num_days()
    };
    if (completed.len() as i64 + 1) < required {
        let err = AppError::Validation(
            "More than one day was missed; the challenge cannot be restored".into(),
        );
        return reject(uow, err).await;
    }

    lifecycle::mark_restored(&mut enrollment);
    uow.save_enrollment(&enrollment).await?;
    info!("User {user_id} restored enrollment {}", enrollment.id);
    let completion =
        complete_day(uow.as_mut(), &day, enrollment, &challenge, missed, activity_data).await?;
    uow.commit().await?;
    Ok(completion)
}

/// Terminal enrollments, newest first.
pub async fn challenge_history(
    store: &dyn Store,
    clock: &dyn Clock,
    user_id: Uuid,
    offset: i64,
    limit: i64,
) -> Result<Vec<HistoryEntry>, AppError> {
    let mut uow = store.begin().await?;
    let day = resolve_local_day(uow.as_mut(), clock, user_id).await?;
    sweep_user(uow.as_mut(), user_id, &day).await?;
    let history = uow.enrollment_history(user_id, offset, limit).await?;
    uow.commit().await?;
    Ok(history
        .into_iter()
        .map(|enrollment| HistoryEntry {
            status: enrollment.status(),
            enrollment,
        })
        .collect())
}

/// Awards of a user, newest first, each with its badge definition.
pub async fn user_badges(store: &dyn Store, user_id: Uuid) -> Result<Vec<EarnedBadge>, AppError> {
    let mut uow = store.begin().await?;
    if uow.user(user_id).await?.is_none() {
        return Err(AppError::NotFound(format!("User {user_id} not found")));
    }
    let mut earned = Vec::new();
    for award in uow.user_badges(user_id).await? {
        let badge = uow.badge(award.badge_id).await?;
        earned.push(EarnedBadge { award, badge });
    }
    Ok(earned)
}

pub async fn available_challenges(store: &dyn Store) -> Result<Vec<Challenge>, AppError> {
    let mut uow = store.begin().await?;
    Ok(uow.challenges(false).await?)
}

pub async fn challenge_by_id(store: &dyn Store, challenge_id: Uuid) -> Result<Challenge, AppError> {
    let mut uow = store.begin().await?;
    load_challenge(uow.as_mut(), challenge_id).await
}

/// Admin: flips a definition between enabled and disabled.
pub async fn toggle_challenge(store: &dyn Store, challenge_id: Uuid) -> Result<Challenge, AppError> {
    let mut uow = store.begin().await?;
    let mut challenge = load_challenge(uow.as_mut(), challenge_id).await?;
    challenge.is_active = !challenge.is_active;
    uow.save_challenge(&challenge).await?;
    uow.commit().await?;
    info!(
        "Challenge '{}' is now {}",
        challenge.title,
        if challenge.is_active { "active" } else { "inactive" }
    );
    Ok(challenge)
}

pub async fn system_stats(store: &dyn Store) -> Result<SystemStats, AppError> {
    let mut uow = store.begin().await?;
    uow.stats().await
}
