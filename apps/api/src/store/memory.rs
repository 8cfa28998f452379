//! In-process store used by the test suite.
//!
//! `begin` takes the store-wide lock, so units of work are serialised exactly like
//! row locks would serialise them. Writes land on a private copy that `commit`
//! swaps in; dropping the unit of work throws the copy away.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sqlx::types::Json;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    ActivityRepository, BadgeRepository, ChallengeRepository, SkillRepository, Store,
    StoreResult, StreakRepository, UnitOfWork, UserRepository,
};
use crate::errors::AppError;
use crate::models::activity::{ActivityStreak, UserActivity, WeightEntry};
use crate::models::challenge::{
    Badge, Challenge, ChallengeProgress, SystemStats, TargetStat, UserBadge, UserChallenge,
};
use crate::models::skill::{Skill, SkillName};
use crate::models::user::User;

#[derive(Debug, Default, Clone)]
struct MemoryData {
    users: Vec<User>,
    skills: Vec<Skill>,
    streaks: Vec<ActivityStreak>,
    activities: Vec<UserActivity>,
    weights: Vec<WeightEntry>,
    challenges: Vec<Challenge>,
    badges: Vec<Badge>,
    enrollments: Vec<UserChallenge>,
    progress: Vec<ChallengeProgress>,
    user_badges: Vec<UserBadge>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<MemoryData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_user(&self, username: &str, timezone: Option<&str>) -> Uuid {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            timezone: timezone.map(str::to_string),
            created_at: Utc::now(),
        };
        let id = user.id;
        self.data.lock().await.users.push(user);
        id
    }

    /// A user owning every skill, last touched long before any test clock.
    pub async fn seed_user_with_skills(&self, username: &str, timezone: Option<&str>) -> Uuid {
        let id = self.seed_user(username, timezone).await;
        let epoch = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let mut data = self.data.lock().await;
        for name in SkillName::ALL {
            data.skills.push(Skill::new(id, name, epoch));
        }
        id
    }

    pub async fn set_timezone(&self, user_id: Uuid, timezone: &str) {
        let mut data = self.data.lock().await;
        if let Some(user) = data.users.iter_mut().find(|u| u.id == user_id) {
            user.timezone = Some(timezone.to_string());
        }
    }

    pub async fn seed_badge(&self, title: &str) -> Uuid {
        let badge = Badge {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            icon_url: None,
        };
        let id = badge.id;
        self.data.lock().await.badges.push(badge);
        id
    }

    pub async fn seed_challenge(
        &self,
        title: &str,
        duration_days: i32,
        stats: &[(SkillName, i32)],
        badge_id: Option<Uuid>,
    ) -> Uuid {
        let challenge = Challenge {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            duration_days,
            target_stats: Json(
                stats
                    .iter()
                    .map(|(name, xp)| TargetStat {
                        stat: name.to_string(),
                        xp: *xp,
                    })
                    .collect(),
            ),
            completion_xp_bonus: 50,
            badge_id,
            activity_type: None,
            is_active: true,
        };
        let id = challenge.id;
        self.data.lock().await.challenges.push(challenge);
        id
    }

    pub async fn activity_count(&self) -> usize {
        self.data.lock().await.activities.len()
    }

    pub async fn weight_history(&self, user_id: Uuid) -> Vec<WeightEntry> {
        let data = self.data.lock().await;
        data.weights
            .iter()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn enrollments(&self, user_id: Uuid) -> Vec<UserChallenge> {
        let data = self.data.lock().await;
        data.enrollments
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn badge_awards(&self, user_id: Uuid) -> usize {
        let data = self.data.lock().await;
        data.user_badges.iter().filter(|b| b.user_id == user_id).count()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let guard = self.data.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, work }))
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryData>,
    work: MemoryData,
}

/// Replaces the element matching `pred`, or appends `value` when none matches.
fn upsert<T: Clone>(items: &mut Vec<T>, value: &T, pred: impl Fn(&T) -> bool) {
    match items.iter_mut().find(|item| pred(item)) {
        Some(slot) => *slot = value.clone(),
        None => items.push(value.clone()),
    }
}

#[async_trait]
impl UserRepository for MemoryUnitOfWork {
    async fn user(&mut self, user_id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.work.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn user_ids(&mut self) -> StoreResult<Vec<Uuid>> {
        Ok(self.work.users.iter().map(|u| u.id).collect())
    }
}

#[async_trait]
impl SkillRepository for MemoryUnitOfWork {
    async fn skills_for_user(&mut self, user_id: Uuid) -> StoreResult<Vec<Skill>> {
        Ok(self
            .work
            .skills
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn skill(&mut self, user_id: Uuid, name: &str) -> StoreResult<Option<Skill>> {
        Ok(self
            .work
            .skills
            .iter()
            .find(|s| s.user_id == user_id && s.name == name)
            .cloned())
    }

    async fn insert_skill(&mut self, skill: &Skill) -> StoreResult<()> {
        self.work.skills.push(skill.clone());
        Ok(())
    }

    async fn save_skill(&mut self, skill: &Skill) -> StoreResult<()> {
        upsert(&mut self.work.skills, skill, |s| s.id == skill.id);
        Ok(())
    }
}

#[async_trait]
impl StreakRepository for MemoryUnitOfWork {
    async fn streak(
        &mut self,
        user_id: Uuid,
        activity_type: &str,
    ) -> StoreResult<Option<ActivityStreak>> {
        Ok(self
            .work
            .streaks
            .iter()
            .find(|s| s.user_id == user_id && s.activity_type == activity_type)
            .cloned())
    }

    async fn streaks_for_user(&mut self, user_id: Uuid) -> StoreResult<Vec<ActivityStreak>> {
        Ok(self
            .work
            .streaks
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn save_streak(&mut self, streak: &ActivityStreak) -> StoreResult<()> {
        upsert(&mut self.work.streaks, streak, |s| {
            s.user_id == streak.user_id && s.activity_type == streak.activity_type
        });
        Ok(())
    }
}

#[async_trait]
impl ActivityRepository for MemoryUnitOfWork {
    async fn insert_activity(&mut self, activity: &UserActivity) -> StoreResult<()> {
        self.work.activities.push(activity.clone());
        Ok(())
    }

    async fn weight_entries(&mut self, user_id: Uuid) -> StoreResult<Vec<WeightEntry>> {
        let mut entries: Vec<WeightEntry> = self
            .work
            .weights
            .iter()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by_key(|w| (w.date, w.created_at));
        Ok(entries)
    }

    async fn insert_weight_entry(&mut self, entry: &WeightEntry) -> StoreResult<()> {
        self.work.weights.push(entry.clone());
        Ok(())
    }

    async fn save_weight_entry(&mut self, entry: &WeightEntry) -> StoreResult<()> {
        upsert(&mut self.work.weights, entry, |w| w.id == entry.id);
        Ok(())
    }
}

#[async_trait]
impl ChallengeRepository for MemoryUnitOfWork {
    async fn challenge(&mut self, challenge_id: Uuid) -> StoreResult<Option<Challenge>> {
        Ok(self
            .work
            .challenges
            .iter()
            .find(|c| c.id == challenge_id)
            .cloned())
    }

    async fn challenges(&mut self, include_inactive: bool) -> StoreResult<Vec<Challenge>> {
        Ok(self
            .work
            .challenges
            .iter()
            .filter(|c| include_inactive || c.is_active)
            .cloned()
            .collect())
    }

    async fn save_challenge(&mut self, challenge: &Challenge) -> StoreResult<()> {
        upsert(&mut self.work.challenges, challenge, |c| c.id == challenge.id);
        Ok(())
    }

    async fn active_enrollments(
        &mut self,
        user_id: Option<Uuid>,
    ) -> StoreResult<Vec<UserChallenge>> {
        Ok(self
            .work
            .enrollments
            .iter()
            .filter(|e| e.is_active && user_id.map_or(true, |u| e.user_id == u))
            .cloned()
            .collect())
    }

    async fn enrollment_history(
        &mut self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<UserChallenge>> {
        let mut past: Vec<UserChallenge> = self
            .work
            .enrollments
            .iter()
            .filter(|e| e.user_id == user_id && !e.is_active)
            .cloned()
            .collect();
        past.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(past
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn insert_enrollment(&mut self, enrollment: &UserChallenge) -> StoreResult<()> {
        let clash = self
            .work
            .enrollments
            .iter()
            .any(|e| e.user_id == enrollment.user_id && e.is_active);
        if enrollment.is_active && clash {
            return Err(AppError::Conflict(
                "User already has an active challenge".into(),
            ));
        }
        self.work.enrollments.push(enrollment.clone());
        Ok(())
    }

    async fn save_enrollment(&mut self, enrollment: &UserChallenge) -> StoreResult<()> {
        upsert(&mut self.work.enrollments, enrollment, |e| e.id == enrollment.id);
        Ok(())
    }

    async fn progress_for(
        &mut self,
        user_challenge_id: Uuid,
    ) -> StoreResult<Vec<ChallengeProgress>> {
        let mut rows: Vec<ChallengeProgress> = self
            .work
            .progress
            .iter()
            .filter(|p| p.user_challenge_id == user_challenge_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.completion_date);
        Ok(rows)
    }

    async fn insert_progress(&mut self, progress: &ChallengeProgress) -> StoreResult<()> {
        let duplicate = self.work.progress.iter().any(|p| {
            p.user_challenge_id == progress.user_challenge_id
                && p.completion_date == progress.completion_date
        });
        if duplicate {
            return Err(AppError::AlreadyCompleted(format!(
                "{} is already marked as complete",
                progress.completion_date
            )));
        }
        self.work.progress.push(progress.clone());
        Ok(())
    }
}

#[async_trait]
impl BadgeRepository for MemoryUnitOfWork {
    async fn badge(&mut self, badge_id: Uuid) -> StoreResult<Option<Badge>> {
        Ok(self.work.badges.iter().find(|b| b.id == badge_id).cloned())
    }

    async fn user_badge(
        &mut self,
        user_id: Uuid,
        badge_id: Uuid,
    ) -> StoreResult<Option<UserBadge>> {
        Ok(self
            .work
            .user_badges
            .iter()
            .find(|b| b.user_id == user_id && b.badge_id == badge_id)
            .cloned())
    }

    async fn user_badges(&mut self, user_id: Uuid) -> StoreResult<Vec<UserBadge>> {
        Ok(self
            .work
            .user_badges
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_user_badge(&mut self, badge: &UserBadge) -> StoreResult<()> {
        self.work.user_badges.push(badge.clone());
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn stats(&mut self) -> StoreResult<SystemStats> {
        let engaged: HashSet<Uuid> = self
            .work
            .enrollments
            .iter()
            .filter(|e| e.is_active)
            .map(|e| e.user_id)
            .collect();
        Ok(SystemStats {
            total_users: self.work.users.len() as i64,
            total_challenges: self.work.challenges.len() as i64,
            active_challenges: self.work.challenges.iter().filter(|c| c.is_active).count() as i64,
            users_with_active_challenges: engaged.len() as i64,
        })
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryUnitOfWork { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}
