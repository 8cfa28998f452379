//! XP rules per activity family.
//!
//! All functions here are pure. `daily_xp_earned` is the target skill's counter
//! for the user's current day; zero means "first qualifying event today".
//! Unknown activity types and interaction subtypes award 0 and never fail.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::skill::SkillName;

pub const WORKOUT_XP_CAP: i32 = 100;
const WORKOUT_VOLUME_XP_CAP: i32 = 50;
const WORKOUT_INTENSITY_XP_CAP: i32 = 35;
const WEIGHT_XP_PER_DAY: i32 = 2;
const WEIGHT_PROGRESS_BONUS: i32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Meditate,
    Run,
    Socialize,
    Read,
    TakeClass,
    Journal,
    Reflect,
    Workout,
    WeightTracking,
}

impl ActivityKind {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw.trim() {
            "meditate" => ActivityKind::Meditate,
            "run" => ActivityKind::Run,
            "socialize" => ActivityKind::Socialize,
            "read" => ActivityKind::Read,
            "take_class" => ActivityKind::TakeClass,
            "journal" => ActivityKind::Journal,
            "reflect" => ActivityKind::Reflect,
            "workout" => ActivityKind::Workout,
            "weight_tracking" => ActivityKind::WeightTracking,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Meditate => "meditate",
            ActivityKind::Run => "run",
            ActivityKind::Socialize => "socialize",
            ActivityKind::Read => "read",
            ActivityKind::TakeClass => "take_class",
            ActivityKind::Journal => "journal",
            ActivityKind::Reflect => "reflect",
            ActivityKind::Workout => "workout",
            ActivityKind::WeightTracking => "weight_tracking",
        }
    }

    /// The skill whose daily counter gates first-session bonuses and which receives the award.
    pub fn primary_skill(&self) -> SkillName {
        match self {
            ActivityKind::Meditate => SkillName::Awareness,
            ActivityKind::Run => SkillName::Endurance,
            ActivityKind::Socialize => SkillName::Charisma,
            ActivityKind::Read | ActivityKind::TakeClass => SkillName::Intelligence,
            ActivityKind::Journal | ActivityKind::Reflect => SkillName::Wisdom,
            ActivityKind::Workout | ActivityKind::WeightTracking => SkillName::Strength,
        }
    }

    /// Skills credited with the same amount in addition to the primary one.
    pub fn bonus_skills(&self) -> &'static [SkillName] {
        match self {
            ActivityKind::Journal => &[SkillName::Creativity],
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialInteraction {
    Presentation,
    ApproachStranger,
    SocialGathering,
    TellStory,
    MakeLaugh,
    GiveCompliment,
}

impl SocialInteraction {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw.trim() {
            "presentation" => SocialInteraction::Presentation,
            "approach_stranger" => SocialInteraction::ApproachStranger,
            "social_gathering" => SocialInteraction::SocialGathering,
            "tell_story" => SocialInteraction::TellStory,
            "make_laugh" => SocialInteraction::MakeLaugh,
            "give_compliment" => SocialInteraction::GiveCompliment,
            _ => return None,
        })
    }

    pub fn xp(&self) -> i32 {
        match self {
            SocialInteraction::Presentation => 40,
            SocialInteraction::ApproachStranger => 30,
            SocialInteraction::SocialGathering => 12,
            SocialInteraction::TellStory => 10,
            SocialInteraction::MakeLaugh => 8,
            SocialInteraction::GiveCompliment => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSet {
    pub weight: f64,
    pub reps: i32,
}

/// Raw metrics of one submission. Fields irrelevant to an activity are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityMetrics {
    #[serde(default)]
    pub duration: i32,
    #[serde(default)]
    pub distance: f64,
    /// Interaction subtype for `socialize`, free text otherwise.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sets: Vec<WorkoutSet>,
}

/// Dispatch over every activity family.
///
/// Weight tracking depends on log history rather than a single submission and is
/// scored by [`weight_tracking_xp`]; here it yields 0.
pub fn compute_xp(kind: ActivityKind, metrics: &ActivityMetrics, daily_xp_earned: i32) -> i32 {
    match kind {
        ActivityKind::Meditate => meditation_xp(metrics.duration, daily_xp_earned),
        ActivityKind::Run => running_xp(metrics.duration, metrics.distance, daily_xp_earned),
        ActivityKind::Socialize => social_xp(metrics.description.as_deref().unwrap_or_default()),
        ActivityKind::Read | ActivityKind::TakeClass => {
            learning_xp(kind, metrics.duration, daily_xp_earned)
        }
        ActivityKind::Journal | ActivityKind::Reflect => reflection_xp(daily_xp_earned),
        ActivityKind::Workout => workout_xp(&metrics.sets, daily_xp_earned),
        ActivityKind::WeightTracking => 0,
    }
}

fn first_of_day(daily_xp_earned: i32, bonus: i32) -> i32 {
    if daily_xp_earned == 0 {
        bonus
    } else {
        0
    }
}

/// Rounds minutes down to whole `block`s and pays `per_block` for each.
fn per_block(minutes: i32, block: i32, per_block: i32) -> i32 {
    (minutes.max(0) / block).saturating_mul(per_block)
}

pub fn meditation_xp(duration: i32, daily_xp_earned: i32) -> i32 {
    first_of_day(daily_xp_earned, 5) + per_block(duration, 5, 5)
}

pub fn running_xp(duration: i32, distance: f64, daily_xp_earned: i32) -> i32 {
    let distance_xp = (distance.max(0.0) * 0.5 * 5.0).ceil() as i32;
    first_of_day(daily_xp_earned, 10) + per_block(duration, 10, 5) + distance_xp
}

pub fn social_xp(interaction: &str) -> i32 {
    SocialInteraction::parse(interaction).map_or(0, |i| i.xp())
}

pub fn learning_xp(kind: ActivityKind, duration: i32, daily_xp_earned: i32) -> i32 {
    let minutes_xp = match kind {
        ActivityKind::TakeClass => per_block(duration, 5, 5),
        _ => per_block(duration, 10, 5),
    };
    first_of_day(daily_xp_earned, 5) + minutes_xp
}

pub fn reflection_xp(daily_xp_earned: i32) -> i32 {
    first_of_day(daily_xp_earned, 20)
}

pub fn workout_volume(sets: &[WorkoutSet]) -> f64 {
    sets.iter()
        .map(|s| s.weight.max(0.0) * f64::from(s.reps.max(0)))
        .sum()
}

/// Per set: `weight * reps * (1 + reps / 30)`, rewarding higher-rep work.
pub fn workout_intensity(sets: &[WorkoutSet]) -> f64 {
    sets.iter()
        .map(|s| {
            let reps = f64::from(s.reps.max(0));
            s.weight.max(0.0) * reps * (1.0 + reps / 30.0)
        })
        .sum()
}

pub fn workout_xp(sets: &[WorkoutSet], daily_xp_earned: i32) -> i32 {
    let volume_xp = ((workout_volume(sets) / 100.0).floor() as i32).min(WORKOUT_VOLUME_XP_CAP);
    let intensity_xp =
        ((workout_intensity(sets) / 20.0).floor() as i32).min(WORKOUT_INTENSITY_XP_CAP);
    (first_of_day(daily_xp_earned, 15) + volume_xp + intensity_xp).min(WORKOUT_XP_CAP)
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// True when `current` sits strictly closer to `goal` than `baseline`, on the goal's side.
pub fn moved_toward_goal(current: f64, baseline: f64, goal: f64) -> bool {
    (current < baseline && goal < baseline) || (current > baseline && goal > baseline)
}

/// Weight tracking award over trailing windows ending at `today`.
///
/// * 2 XP per distinct day logged in the 14 days `today-13..=today`.
/// * 15 XP when this week's average (`today-6..=today`) moved toward the goal
///   compared with the previous week's average (`today-13..=today-7`), or with
///   `starting_weight` when the previous week has no entries.
///
/// Without a goal nothing is awarded.
pub fn weight_tracking_xp(
    logs: &[(NaiveDate, f64)],
    starting_weight: f64,
    goal: Option<f64>,
    today: NaiveDate,
) -> i32 {
    let Some(goal) = goal else {
        return 0;
    };
    let current_from = today - Duration::days(6);
    let previous_from = today - Duration::days(13);

    let in_window: Vec<&(NaiveDate, f64)> = logs
        .iter()
        .filter(|(d, _)| previous_from <= *d && *d <= today)
        .collect();
    if in_window.is_empty() {
        return 0;
    }

    let distinct_days: BTreeSet<NaiveDate> = in_window.iter().map(|(d, _)| *d).collect();
    let base_xp = WEIGHT_XP_PER_DAY * distinct_days.len() as i32;

    let current_avg = average(
        in_window
            .iter()
            .filter(|(d, _)| *d >= current_from)
            .map(|(_, w)| *w),
    );
    let previous_avg = average(
        in_window
            .iter()
            .filter(|(d, _)| *d < current_from)
            .map(|(_, w)| *w),
    );

    let progress_xp = match current_avg {
        Some(current) if moved_toward_goal(current, previous_avg.unwrap_or(starting_weight), goal) => {
            WEIGHT_PROGRESS_BONUS
        }
        _ => 0,
    };
    base_xp + progress_xp
}
