//! Skill ledger: daily counters, XP application and the leveling curve.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::{resolve_local_day, Clock, LocalDay};
use crate::errors::AppError;
use crate::models::skill::{Skill, SkillName};
use crate::store::{Store, UnitOfWork};

pub const BASE_XP: f64 = 100.0;

/// XP needed to leave `level`: `floor(100 * level^1.5)`.
pub fn required_xp(level: i32) -> i32 {
    (BASE_XP * f64::from(level.max(1)).powf(1.5)).floor() as i32
}

/// Spends accumulated XP on as many level-ups as it covers, keeping the remainder.
/// Returns the number of levels gained.
pub fn apply_level_ups(skill: &mut Skill) -> i32 {
    let mut gained = 0;
    while skill.xp >= required_xp(skill.level) {
        skill.xp -= required_xp(skill.level);
        skill.level += 1;
        gained += 1;
    }
    gained
}

/// Zeroes `daily_xp_earned` when the skill was last touched on an earlier local day.
/// Returns whether anything changed.
pub fn rollover_if_new_day(skill: &mut Skill, day: &LocalDay) -> bool {
    if day.day_of(skill.last_updated) < day.today && skill.daily_xp_earned != 0 {
        skill.daily_xp_earned = 0;
        skill.last_updated = day.now;
        return true;
    }
    false
}

/// Loads every skill of the user, rolling stale daily counters over first.
///
/// XP rules read other skills' counters as "already active today" signals, so the
/// rollover has to cover all of them, not just the one about to be credited.
pub async fn load_skills_for_today(
    uow: &mut dyn UnitOfWork,
    user_id: Uuid,
    day: &LocalDay,
) -> Result<Vec<Skill>, AppError> {
    let mut skills = uow.skills_for_user(user_id).await?;
    for skill in skills.iter_mut() {
        if rollover_if_new_day(skill, day) {
            debug!("Rolled over daily XP for {} of user {user_id}", skill.name);
            uow.save_skill(skill).await?;
        }
    }
    Ok(skills)
}

/// Daily counters by skill, as consumed by the XP rules.
pub fn daily_xp_by_skill(skills: &[Skill]) -> HashMap<SkillName, i32> {
    skills
        .iter()
        .filter_map(|s| s.skill_name().map(|n| (n, s.daily_xp_earned)))
        .collect()
}

/// `applyXp`: credits `amount` to one skill and levels it up.
/// A skill the user does not own is a no-op and yields `None`.
pub async fn apply_xp(
    uow: &mut dyn UnitOfWork,
    user_id: Uuid,
    name: SkillName,
    amount: i32,
    day: &LocalDay,
) -> Result<Option<Skill>, AppError> {
    if amount < 0 {
        return Err(AppError::Validation(format!(
            "XP amount must be non-negative, got {amount}"
        )));
    }
    let Some(mut skill) = uow.skill(user_id, name.as_str()).await? else {
        debug!("User {user_id} has no {name} skill; skipping {amount} XP");
        return Ok(None);
    };

    rollover_if_new_day(&mut skill, day);
    skill.xp = skill.xp.saturating_add(amount);
    skill.daily_xp_earned = skill.daily_xp_earned.saturating_add(amount);
    let gained = apply_level_ups(&mut skill);
    skill.last_updated = day.now;
    uow.save_skill(&skill).await?;

    if gained > 0 {
        info!(
            "User {user_id} {name} reached level {} (+{gained})",
            skill.level
        );
    }
    Ok(Some(skill))
}

/// Creates whichever of the fixed skills the user is missing. Idempotent.
/// Returns the names that were created.
pub async fn provision_skills(
    uow: &mut dyn UnitOfWork,
    user_id: Uuid,
    day: &LocalDay,
) -> Result<Vec<SkillName>, AppError> {
    let existing: Vec<SkillName> = uow
        .skills_for_user(user_id)
        .await?
        .iter()
        .filter_map(Skill::skill_name)
        .collect();
    let mut created = Vec::new();
    for name in SkillName::ALL {
        if !existing.contains(&name) {
            uow.insert_skill(&Skill::new(user_id, name, day.now)).await?;
            created.push(name);
        }
    }
    Ok(created)
}

/// Skills as the user should see them today, with stale counters rolled over.
pub async fn user_skills(
    store: &dyn Store,
    clock: &dyn Clock,
    user_id: Uuid,
) -> Result<Vec<Skill>, AppError> {
    let mut uow = store.begin().await?;
    let day = resolve_local_day(uow.as_mut(), clock, user_id).await?;
    let skills = load_skills_for_today(uow.as_mut(), user_id, &day).await?;
    uow.commit().await?;
    Ok(skills)
}

#[derive(Debug, Default, Serialize)]
pub struct BackfillReport {
    pub users_checked: usize,
    pub skills_created: usize,
}

/// Admin: provisions the fixed skill set for every user. Safe to rerun.
pub async fn backfill_skills(store: &dyn Store, clock: &dyn Clock) -> Result<BackfillReport, AppError> {
    let mut uow = store.begin().await?;
    let mut report = BackfillReport::default();
    for user_id in uow.user_ids().await? {
        let day = resolve_local_day(uow.as_mut(), clock, user_id).await?;
        let created = provision_skills(uow.as_mut(), user_id, &day).await?;
        if !created.is_empty() {
            info!("Provisioned {} skill(s) for user {user_id}", created.len());
        }
        report.users_checked += 1;
        report.skills_created += created.len();
    }
    uow.commit().await?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::parse_zone;
    use crate::clock::FixedClock;
    use crate::store::memory::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};

    fn skill_with(level: i32, xp: i32) -> Skill {
        let mut s = Skill::new(Uuid::new_v4(), SkillName::Strength, Utc::now());
        s.level = level;
        s.xp = xp;
        s
    }

    fn day_at(h: u32, tz: &str) -> LocalDay {
        LocalDay::new(
            Utc.with_ymd_and_hms(2024, 5, 2, h, 0, 0).unwrap(),
            parse_zone(Some(tz)),
        )
    }

    #[test]
    fn test_required_xp_curve() {
        assert_eq!(required_xp(1), 100);
        assert_eq!(required_xp(2), 282);
        assert_eq!(required_xp(4), 800);
        for level in 1..500 {
            assert!(required_xp(level + 1) > required_xp(level), "level {level}");
        }
    }

    #[test]
    fn test_single_level_up_keeps_remainder() {
        let mut s = skill_with(1, 130);
        assert_eq!(apply_level_ups(&mut s), 1);
        assert_eq!((s.level, s.xp), (2, 30));
    }

    #[test]
    fn test_large_award_levels_multiple_times() {
        // 100 + 282 + 519 = 901 to reach level 4
        let mut s = skill_with(1, 905);
        assert_eq!(apply_level_ups(&mut s), 3);
        assert_eq!((s.level, s.xp), (4, 4));
    }

    #[test]
    fn test_invariant_holds_over_award_sequences() {
        let mut s = skill_with(1, 0);
        for amount in [0, 5, 99, 1, 250, 3000, 17, 40_000, 2] {
            s.xp += amount;
            apply_level_ups(&mut s);
            assert!(s.xp >= 0 && s.xp < required_xp(s.level));
        }
    }

    #[test]
    fn test_rollover_on_new_local_day() {
        let day = day_at(12, "UTC");
        let mut s = skill_with(1, 0);
        s.daily_xp_earned = 30;
        s.last_updated = day.now - Duration::days(1);
        assert!(rollover_if_new_day(&mut s, &day));
        assert_eq!(s.daily_xp_earned, 0);
        assert!(!rollover_if_new_day(&mut s, &day));
    }

    #[test]
    fn test_no_rollover_within_same_local_day() {
        // 01:00 UTC on May 2 is still May 1 in New York, same as 20:00 UTC May 1.
        let day = day_at(1, "America/New_York");
        let mut s = skill_with(1, 0);
        s.daily_xp_earned = 30;
        s.last_updated = Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap();
        assert!(!rollover_if_new_day(&mut s, &day));
        assert_eq!(s.daily_xp_earned, 30);
    }

    #[tokio::test]
    async fn test_apply_xp_missing_skill_is_noop() {
        let store = MemoryStore::new();
        let user = store.seed_user("sam", None).await;
        let mut uow = store.begin().await.unwrap();
        let out = apply_xp(uow.as_mut(), user, SkillName::Strength, 50, &day_at(9, "UTC"))
            .await
            .unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_apply_xp_resets_stale_counter_then_adds() {
        let store = MemoryStore::new();
        let user = store.seed_user("sam", None).await;
        let day = day_at(9, "UTC");
        let mut uow = store.begin().await.unwrap();
        provision_skills(uow.as_mut(), user, &day).await.unwrap();
        let mut s = uow.skill(user, "Strength").await.unwrap().unwrap();
        s.daily_xp_earned = 70;
        s.xp = 90;
        s.last_updated = day.now - Duration::days(2);
        uow.save_skill(&s).await.unwrap();

        let s = apply_xp(uow.as_mut(), user, SkillName::Strength, 25, &day)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(s.daily_xp_earned, 25);
        assert_eq!((s.level, s.xp), (2, 15));
        assert_eq!(s.last_updated, day.now);
    }

    #[tokio::test]
    async fn test_apply_xp_rejects_negative_amount() {
        let store = MemoryStore::new();
        let user = store.seed_user("sam", None).await;
        let mut uow = store.begin().await.unwrap();
        let err = apply_xp(uow.as_mut(), user, SkillName::Wisdom, -1, &day_at(9, "UTC"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_apply_xp_saturates_counters_instead_of_overflowing() {
        let store = MemoryStore::new();
        let user = store.seed_user("sam", None).await;
        let day = day_at(9, "UTC");
        let mut uow = store.begin().await.unwrap();
        provision_skills(uow.as_mut(), user, &day).await.unwrap();

        for _ in 0..2 {
            apply_xp(uow.as_mut(), user, SkillName::Awareness, i32::MAX, &day)
                .await
                .unwrap();
        }
        let s = uow.skill(user, "Awareness").await.unwrap().unwrap();
        assert_eq!(s.daily_xp_earned, i32::MAX);
        assert!(s.level > 1);
        assert!(s.xp >= 0 && s.xp < required_xp(s.level));
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let store = MemoryStore::new();
        let user = store.seed_user("sam", None).await;
        let day = day_at(9, "UTC");
        let mut uow = store.begin().await.unwrap();
        assert_eq!(provision_skills(uow.as_mut(), user, &day).await.unwrap().len(), 8);
        assert!(provision_skills(uow.as_mut(), user, &day).await.unwrap().is_empty());
        assert_eq!(uow.skills_for_user(user).await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_backfill_skills_only_fills_gaps() {
        let store = MemoryStore::new();
        let bare = store.seed_user("new", None).await;
        store.seed_user_with_skills("old", Some("Europe/Berlin")).await;
        let clock = FixedClock::at(2024, 5, 2, 9);

        let report = backfill_skills(&store, &clock).await.unwrap();
        assert_eq!(report.users_checked, 2);
        assert_eq!(report.skills_created, 8);
        assert_eq!(backfill_skills(&store, &clock).await.unwrap().skills_created, 0);
        assert_eq!(user_skills(&store, &clock, bare).await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_user_skills_rolls_over_stale_counters() {
        let store = MemoryStore::new();
        let user = store.seed_user_with_skills("ada", None).await;
        let clock = FixedClock::at(2024, 5, 2, 9);
        {
            let mut uow = store.begin().await.unwrap();
            let mut s = uow.skill(user, "Wisdom").await.unwrap().unwrap();
            s.daily_xp_earned = 40;
            uow.save_skill(&s).await.unwrap();
            uow.commit().await.unwrap();
        }
        let skills = user_skills(&store, &clock, user).await.unwrap();
        assert!(skills.iter().all(|s| s.daily_xp_earned == 0));

        let err = user_skills(&store, &clock, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
