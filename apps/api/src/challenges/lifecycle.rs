//! Pure challenge state machine.
//!
//! `Active -> {Completed, Failed, Quit}`; every terminal state clears `is_active`.
//! Day arithmetic is on the user's local calendar: the start day is day 1 and a
//! challenge of N days ends on `start + N - 1`.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::challenge::{Challenge, UserChallenge};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The last day passed without reaching the required count.
    WindowElapsed,
    /// A day before today has no progress row.
    MissedDay,
}

pub fn end_date_for(start_date: NaiveDate, duration_days: i32) -> NaiveDate {
    start_date + Duration::days(i64::from(duration_days.max(1)) - 1)
}

pub fn new_enrollment(
    user_id: Uuid,
    challenge: &Challenge,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> UserChallenge {
    UserChallenge {
        id: Uuid::new_v4(),
        user_id,
        challenge_id: challenge.id,
        start_date: today,
        end_date: end_date_for(today, challenge.duration_days),
        is_active: true,
        is_completed: false,
        is_failed: false,
        quit_date: None,
        completion_date: None,
        failed_at: None,
        created_at: now,
    }
}

/// 1-based index of `today` inside the raw window, without clamping.
fn day_index(enrollment: &UserChallenge, today: NaiveDate) -> i64 {
    (today - enrollment.start_date).num_days() + 1
}

/// Decides whether an active enrollment has to fail.
///
/// Today being incomplete never fails a challenge by itself; only an earlier
/// missing day or running past the end date does.
pub fn evaluate_expiry(
    enrollment: &UserChallenge,
    completed_days: usize,
    today: NaiveDate,
) -> Option<FailureReason> {
    if !enrollment.is_active {
        return None;
    }
    if today > enrollment.end_date {
        return Some(FailureReason::WindowElapsed);
    }
    let current_day = day_index(enrollment, today);
    if current_day > 1 && (completed_days as i64) < current_day - 1 {
        return Some(FailureReason::MissedDay);
    }
    None
}

/// Day number shown to the user: 0 before the start or once terminal, capped at the duration.
pub fn current_day(enrollment: &UserChallenge, duration_days: i32, today: NaiveDate) -> i32 {
    if !enrollment.is_active || today < enrollment.start_date {
        return 0;
    }
    if today > enrollment.end_date {
        return duration_days;
    }
    (day_index(enrollment, today) as i32).min(duration_days)
}

pub fn in_window(enrollment: &UserChallenge, date: NaiveDate) -> bool {
    enrollment.start_date <= date && date <= enrollment.end_date
}

/// Consecutive completed days ending today, or yesterday when today is still open.
pub fn current_streak(completion_dates: &[NaiveDate], today: NaiveDate) -> i32 {
    let mut dates: Vec<NaiveDate> = completion_dates.iter().copied().filter(|d| *d <= today).collect();
    dates.sort_unstable_by(|a, b| b.cmp(a));
    dates.dedup();

    let mut iter = dates.into_iter();
    let Some(latest) = iter.next() else {
        return 0;
    };
    if (today - latest).num_days() > 1 {
        return 0;
    }
    let mut streak = 1;
    let mut expected = latest - Duration::days(1);
    for date in iter {
        if date != expected {
            break;
        }
        streak += 1;
        expected = date - Duration::days(1);
    }
    streak
}

pub fn mark_failed(enrollment: &mut UserChallenge, now: DateTime<Utc>) {
    enrollment.is_active = false;
    enrollment.is_failed = true;
    enrollment.failed_at = Some(now);
}

pub fn mark_completed(enrollment: &mut UserChallenge, today: NaiveDate) {
    enrollment.is_active = false;
    enrollment.is_completed = true;
    enrollment.completion_date = Some(today);
}

pub fn mark_quit(enrollment: &mut UserChallenge, today: NaiveDate) {
    enrollment.is_active = false;
    enrollment.quit_date = Some(today);
}

/// Reopens a failed enrollment during the grace period.
pub fn mark_restored(enrollment: &mut UserChallenge) {
    enrollment.is_active = true;
    enrollment.is_failed = false;
    enrollment.failed_at = None;
}

/// Whether a failure at `failed_at` is still inside the grace period at `now`.
pub fn within_grace(enrollment: &UserChallenge, now: DateTime<Utc>, grace_hours: i64) -> bool {
    enrollment.is_failed
        && enrollment
            .failed_at
            .is_some_and(|at| at <= now && now - at <= Duration::hours(grace_hours))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::challenge::{EnrollmentStatus, TargetStat};
    use sqlx::types::Json;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, day).unwrap()
    }

    fn challenge(duration_days: i32) -> Challenge {
        Challenge {
            id: Uuid::new_v4(),
            title: "Run a mile".into(),
            description: None,
            duration_days,
            target_stats: Json(vec![TargetStat {
                stat: "Endurance".into(),
                xp: 8,
            }]),
            completion_xp_bonus: 0,
            badge_id: None,
            activity_type: Some("run".into()),
            is_active: true,
        }
    }

    fn enrolled(duration: i32, start: NaiveDate) -> UserChallenge {
        new_enrollment(Uuid::new_v4(), &challenge(duration), start, Utc::now())
    }

    #[test]
    fn test_end_date_counts_start_as_day_one() {
        assert_eq!(end_date_for(d(1), 30), d(30));
        assert_eq!(end_date_for(d(1), 1), d(1));
        let e = enrolled(3, d(10));
        assert_eq!((e.start_date, e.end_date), (d(10), d(12)));
        assert_eq!(e.status(), EnrollmentStatus::Active);
    }

    #[test]
    fn test_today_incomplete_does_not_fail() {
        let e = enrolled(3, d(10));
        assert_eq!(evaluate_expiry(&e, 0, d(10)), None);
        assert_eq!(evaluate_expiry(&e, 1, d(11)), None);
        assert_eq!(evaluate_expiry(&e, 2, d(12)), None);
    }

    #[test]
    fn test_skipped_prior_day_fails() {
        let e = enrolled(3, d(10));
        assert_eq!(evaluate_expiry(&e, 0, d(11)), Some(FailureReason::MissedDay));
        assert_eq!(evaluate_expiry(&e, 1, d(12)), Some(FailureReason::MissedDay));
    }

    #[test]
    fn test_past_end_date_fails() {
        let e = enrolled(3, d(10));
        assert_eq!(evaluate_expiry(&e, 3, d(13)), Some(FailureReason::WindowElapsed));
    }

    #[test]
    fn test_terminal_enrollment_never_expires_again() {
        let mut e = enrolled(3, d(10));
        mark_quit(&mut e, d(10));
        assert_eq!(evaluate_expiry(&e, 0, d(20)), None);
        assert_eq!(e.status(), EnrollmentStatus::Quit);
    }

    #[test]
    fn test_current_day_clamps() {
        let e = enrolled(3, d(10));
        assert_eq!(current_day(&e, 3, d(9)), 0);
        assert_eq!(current_day(&e, 3, d(10)), 1);
        assert_eq!(current_day(&e, 3, d(12)), 3);
        assert_eq!(current_day(&e, 3, d(15)), 3);
        let mut done = e.clone();
        mark_completed(&mut done, d(12));
        assert_eq!(current_day(&done, 3, d(12)), 0);
        assert_eq!(done.status(), EnrollmentStatus::Completed);
    }

    #[test]
    fn test_current_streak_anchors_on_today_or_yesterday() {
        assert_eq!(current_streak(&[], d(10)), 0);
        assert_eq!(current_streak(&[d(8), d(9), d(10)], d(10)), 3);
        assert_eq!(current_streak(&[d(8), d(9)], d(10)), 2);
        assert_eq!(current_streak(&[d(7), d(8)], d(10)), 0);
    }

    #[test]
    fn test_current_streak_stops_at_gap() {
        assert_eq!(current_streak(&[d(5), d(7), d(8), d(9)], d(9)), 3);
        assert_eq!(current_streak(&[d(10), d(8)], d(10)), 1);
    }

    #[test]
    fn test_grace_window() {
        let now = Utc::now();
        let mut e = enrolled(5, d(1));
        mark_failed(&mut e, now - Duration::hours(3));
        assert!(within_grace(&e, now, 24));
        assert!(!within_grace(&e, now + Duration::hours(22), 24));
        mark_restored(&mut e);
        assert!(e.is_active && !e.is_failed && e.failed_at.is_none());
        assert!(!within_grace(&e, now, 24));
    }
}
