//! Persistence boundary for the progression engine.
//!
//! The engine never navigates object graphs; it loads and saves plain rows by id
//! through these narrow repository traits. Every mutating operation runs inside a
//! single `UnitOfWork` and calls `commit` once all of its writes are staged.
//! Dropping a unit of work without committing discards everything it wrote.

#[cfg(test)]
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::activity::{ActivityStreak, UserActivity, WeightEntry};
use crate::models::challenge::{
    Badge, Challenge, ChallengeProgress, SystemStats, UserBadge, UserChallenge,
};
use crate::models::skill::Skill;
use crate::models::user::User;

pub type StoreResult<T> = Result<T, AppError>;

#[async_trait]
pub trait UserRepository {
    async fn user(&mut self, user_id: Uuid) -> StoreResult<Option<User>>;
    async fn user_ids(&mut self) -> StoreResult<Vec<Uuid>>;
}

#[async_trait]
pub trait SkillRepository {
    /// Loads all skills of a user, locking them for the rest of the unit of work.
    async fn skills_for_user(&mut self, user_id: Uuid) -> StoreResult<Vec<Skill>>;
    async fn skill(&mut self, user_id: Uuid, name: &str) -> StoreResult<Option<Skill>>;
    async fn insert_skill(&mut self, skill: &Skill) -> StoreResult<()>;
    async fn save_skill(&mut self, skill: &Skill) -> StoreResult<()>;
}

#[async_trait]
pub trait StreakRepository {
    async fn streak(
        &mut self,
        user_id: Uuid,
        activity_type: &str,
    ) -> StoreResult<Option<ActivityStreak>>;
    async fn streaks_for_user(&mut self, user_id: Uuid) -> StoreResult<Vec<ActivityStreak>>;
    /// Inserts or replaces the row for (user, activity_type).
    async fn save_streak(&mut self, streak: &ActivityStreak) -> StoreResult<()>;
}

#[async_trait]
pub trait ActivityRepository {
    async fn insert_activity(&mut self, activity: &UserActivity) -> StoreResult<()>;
    /// All weight entries of a user, oldest first.
    async fn weight_entries(&mut self, user_id: Uuid) -> StoreResult<Vec<WeightEntry>>;
    async fn insert_weight_entry(&mut self, entry: &WeightEntry) -> StoreResult<()>;
    async fn save_weight_entry(&mut self, entry: &WeightEntry) -> StoreResult<()>;
}

#[async_trait]
pub trait ChallengeRepository {
    async fn challenge(&mut self, challenge_id: Uuid) -> StoreResult<Option<Challenge>>;
    async fn challenges(&mut self, include_inactive: bool) -> StoreResult<Vec<Challenge>>;
    async fn save_challenge(&mut self, challenge: &Challenge) -> StoreResult<()>;

    /// Enrollments with `is_active = true`, optionally restricted to one user.
    async fn active_enrollments(
        &mut self,
        user_id: Option<Uuid>,
    ) -> StoreResult<Vec<UserChallenge>>;
    /// Terminal enrollments of a user, newest start date first.
    async fn enrollment_history(
        &mut self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<UserChallenge>>;
    /// Fails with `Conflict` if the user already holds an active enrollment.
    async fn insert_enrollment(&mut self, enrollment: &UserChallenge) -> StoreResult<()>;
    async fn save_enrollment(&mut self, enrollment: &UserChallenge) -> StoreResult<()>;

    /// Progress rows of an enrollment, oldest first.
    async fn progress_for(&mut self, user_challenge_id: Uuid)
        -> StoreResult<Vec<ChallengeProgress>>;
    /// Fails with `AlreadyCompleted` on a duplicate (enrollment, date).
    async fn insert_progress(&mut self, progress: &ChallengeProgress) -> StoreResult<()>;
}

#[async_trait]
pub trait BadgeRepository {
    async fn badge(&mut self, badge_id: Uuid) -> StoreResult<Option<Badge>>;
    async fn user_badge(&mut self, user_id: Uuid, badge_id: Uuid)
        -> StoreResult<Option<UserBadge>>;
    async fn user_badges(&mut self, user_id: Uuid) -> StoreResult<Vec<UserBadge>>;
    async fn insert_user_badge(&mut self, badge: &UserBadge) -> StoreResult<()>;
}

/// One transactional boundary over every repository.
#[async_trait]
pub trait UnitOfWork:
    UserRepository
    + SkillRepository
    + StreakRepository
    + ActivityRepository
    + ChallengeRepository
    + BadgeRepository
    + Send
{
    async fn stats(&mut self) -> StoreResult<SystemStats>;
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Entry point handed to the engine. Carried in `AppState` as `Arc<dyn Store>`.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;
}

