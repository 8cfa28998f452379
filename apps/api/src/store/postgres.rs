//! PostgreSQL implementation of the repository traits.
//!
//! One `sqlx::Transaction` per unit of work. Rows that a mutation reads before
//! writing back (skills, active enrollments) are selected `FOR UPDATE` so that
//! concurrent requests for the same user serialise on the row locks.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{
    ActivityRepository, BadgeRepository, ChallengeRepository, SkillRepository, Store,
    StoreResult, StreakRepository, UnitOfWork, UserRepository,
};
use crate::errors::AppError;
use crate::models::activity::{ActivityStreak, UserActivity, WeightEntry};
use crate::models::challenge::{
    Badge, Challenge, ChallengeProgress, SystemStats, UserBadge, UserChallenge,
};
use crate::models::skill::Skill;
use crate::models::user::User;

/// Partial unique index allowing one `is_active` enrollment per user.
const ONE_ACTIVE_ENROLLMENT_INDEX: &str = "user_challenges_one_active_per_user";
/// Unique (user_challenge_id, completion_date).
const ONE_PROGRESS_PER_DAY_INDEX: &str = "challenge_progress_one_per_day";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

/// Maps a unique violation on `constraint` to `mapped`, passing other errors through.
fn on_unique_violation(err: sqlx::Error, constraint: &str, mapped: AppError) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.constraint() == Some(constraint) => mapped,
        _ => AppError::Database(err),
    }
}

#[async_trait]
impl UserRepository for PgUnitOfWork {
    async fn user(&mut self, user_id: Uuid) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT id, username, timezone, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn user_ids(&mut self) -> StoreResult<Vec<Uuid>> {
        Ok(sqlx::query_scalar("SELECT id FROM users ORDER BY created_at")
            .fetch_all(&mut *self.tx)
            .await?)
    }
}

#[async_trait]
impl SkillRepository for PgUnitOfWork {
    async fn skills_for_user(&mut self, user_id: Uuid) -> StoreResult<Vec<Skill>> {
        Ok(sqlx::query_as::<_, Skill>(
            "SELECT * FROM skills WHERE user_id = $1 ORDER BY name FOR UPDATE",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn skill(&mut self, user_id: Uuid, name: &str) -> StoreResult<Option<Skill>> {
        Ok(sqlx::query_as::<_, Skill>(
            "SELECT * FROM skills WHERE user_id = $1 AND name = $2 FOR UPDATE",
        )
        .bind(user_id)
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn insert_skill(&mut self, skill: &Skill) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO skills (id, user_id, name, level, xp, daily_xp_earned, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, name) DO NOTHING
            "#,
        )
        .bind(skill.id)
        .bind(skill.user_id)
        .bind(&skill.name)
        .bind(skill.level)
        .bind(skill.xp)
        .bind(skill.daily_xp_earned)
        .bind(skill.last_updated)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn save_skill(&mut self, skill: &Skill) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE skills
            SET level = $2, xp = $3, daily_xp_earned = $4, last_updated = $5
            WHERE id = $1
            "#,
        )
        .bind(skill.id)
        .bind(skill.level)
        .bind(skill.xp)
        .bind(skill.daily_xp_earned)
        .bind(skill.last_updated)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StreakRepository for PgUnitOfWork {
    async fn streak(
        &mut self,
        user_id: Uuid,
        activity_type: &str,
    ) -> StoreResult<Option<ActivityStreak>> {
        Ok(sqlx::query_as::<_, ActivityStreak>(
            "SELECT * FROM activity_streaks WHERE user_id = $1 AND activity_type = $2 FOR UPDATE",
        )
        .bind(user_id)
        .bind(activity_type)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn streaks_for_user(&mut self, user_id: Uuid) -> StoreResult<Vec<ActivityStreak>> {
        Ok(sqlx::query_as::<_, ActivityStreak>(
            "SELECT * FROM activity_streaks WHERE user_id = $1 ORDER BY activity_type",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn save_streak(&mut self, streak: &ActivityStreak) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_streaks (id, user_id, activity_type, current_streak, last_activity_date)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, activity_type)
            DO UPDATE SET current_streak = EXCLUDED.current_streak,
                          last_activity_date = EXCLUDED.last_activity_date
            "#,
        )
        .bind(streak.id)
        .bind(streak.user_id)
        .bind(&streak.activity_type)
        .bind(streak.current_streak)
        .bind(streak.last_activity_date)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ActivityRepository for PgUnitOfWork {
    async fn insert_activity(&mut self, activity: &UserActivity) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_activities
                (id, user_id, activity_type, description, notes, duration, distance,
                 volume, xp_earned, date, logged_by_admin, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(activity.id)
        .bind(activity.user_id)
        .bind(&activity.activity_type)
        .bind(&activity.description)
        .bind(&activity.notes)
        .bind(activity.duration)
        .bind(activity.distance)
        .bind(activity.volume)
        .bind(activity.xp_earned)
        .bind(activity.date)
        .bind(activity.logged_by_admin)
        .bind(activity.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn weight_entries(&mut self, user_id: Uuid) -> StoreResult<Vec<WeightEntry>> {
        Ok(sqlx::query_as::<_, WeightEntry>(
            "SELECT * FROM weight_tracking WHERE user_id = $1 ORDER BY date, created_at FOR UPDATE",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn insert_weight_entry(&mut self, entry: &WeightEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO weight_tracking
                (id, user_id, weight, date, weight_goal, is_starting_weight, logged_by_admin, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.weight)
        .bind(entry.date)
        .bind(entry.weight_goal)
        .bind(entry.is_starting_weight)
        .bind(entry.logged_by_admin)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn save_weight_entry(&mut self, entry: &WeightEntry) -> StoreResult<()> {
        sqlx::query(
            "UPDATE weight_tracking SET weight_goal = $2, is_starting_weight = $3 WHERE id = $1",
        )
        .bind(entry.id)
        .bind(entry.weight_goal)
        .bind(entry.is_starting_weight)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ChallengeRepository for PgUnitOfWork {
    async fn challenge(&mut self, challenge_id: Uuid) -> StoreResult<Option<Challenge>> {
        Ok(
            sqlx::query_as::<_, Challenge>("SELECT * FROM challenges WHERE id = $1")
                .bind(challenge_id)
                .fetch_optional(&mut *self.tx)
                .await?,
        )
    }

    async fn challenges(&mut self, include_inactive: bool) -> StoreResult<Vec<Challenge>> {
        Ok(sqlx::query_as::<_, Challenge>(
            "SELECT * FROM challenges WHERE is_active OR $1 ORDER BY title",
        )
        .bind(include_inactive)
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn save_challenge(&mut self, challenge: &Challenge) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE challenges
            SET title = $2, description = $3, duration_days = $4, target_stats = $5,
                completion_xp_bonus = $6, badge_id = $7, activity_type = $8, is_active = $9
            WHERE id = $1
            "#,
        )
        .bind(challenge.id)
        .bind(&challenge.title)
        .bind(&challenge.description)
        .bind(challenge.duration_days)
        .bind(&challenge.target_stats)
        .bind(challenge.completion_xp_bonus)
        .bind(challenge.badge_id)
        .bind(&challenge.activity_type)
        .bind(challenge.is_active)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn active_enrollments(
        &mut self,
        user_id: Option<Uuid>,
    ) -> StoreResult<Vec<UserChallenge>> {
        Ok(sqlx::query_as::<_, UserChallenge>(
            r#"
            SELECT * FROM user_challenges
            WHERE is_active AND ($1::uuid IS NULL OR user_id = $1)
            ORDER BY start_date
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn enrollment_history(
        &mut self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<UserChallenge>> {
        Ok(sqlx::query_as::<_, UserChallenge>(
            r#"
            SELECT * FROM user_challenges
            WHERE user_id = $1 AND NOT is_active
            ORDER BY start_date DESC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn insert_enrollment(&mut self, enrollment: &UserChallenge) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_challenges
                (id, user_id, challenge_id, start_date, end_date, is_active, is_completed,
                 is_failed, quit_date, completion_date, failed_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(enrollment.id)
        .bind(enrollment.user_id)
        .bind(enrollment.challenge_id)
        .bind(enrollment.start_date)
        .bind(enrollment.end_date)
        .bind(enrollment.is_active)
        .bind(enrollment.is_completed)
        .bind(enrollment.is_failed)
        .bind(enrollment.quit_date)
        .bind(enrollment.completion_date)
        .bind(enrollment.failed_at)
        .bind(enrollment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            on_unique_violation(
                e,
                ONE_ACTIVE_ENROLLMENT_INDEX,
                AppError::Conflict("User already has an active challenge".into()),
            )
        })?;
        Ok(())
    }

    async fn save_enrollment(&mut self, enrollment: &UserChallenge) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE user_challenges
            SET is_active = $2, is_completed = $3, is_failed = $4, quit_date = $5,
                completion_date = $6, failed_at = $7
            WHERE id = $1
            "#,
        )
        .bind(enrollment.id)
        .bind(enrollment.is_active)
        .bind(enrollment.is_completed)
        .bind(enrollment.is_failed)
        .bind(enrollment.quit_date)
        .bind(enrollment.completion_date)
        .bind(enrollment.failed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            on_unique_violation(
                e,
                ONE_ACTIVE_ENROLLMENT_INDEX,
                AppError::Conflict("User already has an active challenge".into()),
            )
        })?;
        Ok(())
    }

    async fn progress_for(
        &mut self,
        user_challenge_id: Uuid,
    ) -> StoreResult<Vec<ChallengeProgress>> {
        Ok(sqlx::query_as::<_, ChallengeProgress>(
            "SELECT * FROM challenge_progress WHERE user_challenge_id = $1 ORDER BY completion_date",
        )
        .bind(user_challenge_id)
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn insert_progress(&mut self, progress: &ChallengeProgress) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO challenge_progress
                (id, user_challenge_id, completion_date, activity_data, xp_awarded, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(progress.id)
        .bind(progress.user_challenge_id)
        .bind(progress.completion_date)
        .bind(&progress.activity_data)
        .bind(progress.xp_awarded)
        .bind(progress.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            on_unique_violation(
                e,
                ONE_PROGRESS_PER_DAY_INDEX,
                AppError::AlreadyCompleted(format!(
                    "{} is already marked as complete",
                    progress.completion_date
                )),
            )
        })?;
        Ok(())
    }
}

#[async_trait]
impl BadgeRepository for PgUnitOfWork {
    async fn badge(&mut self, badge_id: Uuid) -> StoreResult<Option<Badge>> {
        Ok(
            sqlx::query_as::<_, Badge>("SELECT * FROM badges WHERE id = $1")
                .bind(badge_id)
                .fetch_optional(&mut *self.tx)
                .await?,
        )
    }

    async fn user_badge(
        &mut self,
        user_id: Uuid,
        badge_id: Uuid,
    ) -> StoreResult<Option<UserBadge>> {
        Ok(sqlx::query_as::<_, UserBadge>(
            "SELECT * FROM user_badges WHERE user_id = $1 AND badge_id = $2",
        )
        .bind(user_id)
        .bind(badge_id)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn user_badges(&mut self, user_id: Uuid) -> StoreResult<Vec<UserBadge>> {
        Ok(sqlx::query_as::<_, UserBadge>(
            "SELECT * FROM user_badges WHERE user_id = $1 ORDER BY earned_date DESC",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn insert_user_badge(&mut self, badge: &UserBadge) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_badges (id, user_id, badge_id, earned_date, user_challenge_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, badge_id) DO NOTHING
            "#,
        )
        .bind(badge.id)
        .bind(badge.user_id)
        .bind(badge.badge_id)
        .bind(badge.earned_date)
        .bind(badge.user_challenge_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn stats(&mut self) -> StoreResult<SystemStats> {
        let (total_users, total_challenges, active_challenges, users_with_active_challenges): (
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM challenges),
                (SELECT COUNT(*) FROM challenges WHERE is_active),
                (SELECT COUNT(DISTINCT user_id) FROM user_challenges WHERE is_active)
            "#,
        )
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(SystemStats {
            total_users,
            total_challenges,
            active_challenges,
            users_with_active_challenges,
        })
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
