//! Per-user notion of "today".
//!
//! Every date-sensitive rule compares against the user's local calendar day,
//! never the server's. The wall clock is injected so tests can pin it.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::store::UnitOfWork;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Parses an IANA zone name, falling back to UTC for missing or unknown names.
pub fn parse_zone(name: Option<&str>) -> Tz {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        None => Tz::UTC,
        Some(n) => n.parse::<Tz>().unwrap_or_else(|_| {
            warn!("Unrecognised timezone '{n}', falling back to UTC");
            Tz::UTC
        }),
    }
}

/// A resolved clock reading for one user.
#[derive(Debug, Clone, Copy)]
pub struct LocalDay {
    pub now: DateTime<Utc>,
    pub tz: Tz,
    pub today: NaiveDate,
}

impl LocalDay {
    pub fn new(now: DateTime<Utc>, tz: Tz) -> Self {
        Self {
            now,
            tz,
            today: now.with_timezone(&tz).date_naive(),
        }
    }

    /// Reads `now` in a stored zone name; see [`parse_zone`] for the fallback.
    pub fn in_zone(now: DateTime<Utc>, zone: Option<&str>) -> Self {
        Self::new(now, parse_zone(zone))
    }

    /// The user's calendar day of an arbitrary instant.
    pub fn day_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    pub fn yesterday(&self) -> NaiveDate {
        self.today.pred_opt().unwrap_or(self.today)
    }
}

/// `todayFor(userId)`: looks up the stored timezone and reads the clock in it.
pub async fn resolve_local_day(
    uow: &mut dyn UnitOfWork,
    clock: &dyn Clock,
    user_id: Uuid,
) -> Result<LocalDay, AppError> {
    let user = uow
        .user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))?;
    Ok(LocalDay::in_zone(clock.now(), user.timezone.as_deref()))
}

#[cfg(test)]
pub use fixed::FixedClock;


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instant(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_missing_zone_is_utc() {
        let now = instant(2024, 3, 10, 23);
        assert_eq!(
            LocalDay::in_zone(now, None).today,
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
        );
        assert_eq!(parse_zone(Some("  ")), Tz::UTC);
    }

    #[test]
    fn test_invalid_zone_falls_back_to_utc() {
        assert_eq!(parse_zone(Some("Mars/Olympus_Mons")), Tz::UTC);
    }

    #[test]
    fn test_zone_ahead_of_utc_rolls_date_forward() {
        // 23:00 UTC is already the next morning in Tokyo.
        let now = instant(2024, 3, 10, 23);
        assert_eq!(
            LocalDay::in_zone(now, Some("Asia/Tokyo")).today,
            NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
        );
    }

    #[test]
    fn test_zone_behind_utc_keeps_previous_date() {
        let now = instant(2024, 3, 11, 2);
        assert_eq!(
            LocalDay::in_zone(now, Some("America/New_York")).today,
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
        );
    }

    #[test]
    fn test_local_day_of_instant() {
        let day = LocalDay::new(instant(2024, 3, 11, 12), parse_zone(Some("Asia/Tokyo")));
        assert_eq!(
            day.day_of(instant(2024, 3, 10, 16)),
            NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
        );
        assert_eq!(day.yesterday(), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
    }

    #[test]
    fn test_fixed_clock_advances() {
        let clock = FixedClock::at(2024, 1, 1, 12);
        clock.advance_days(2);
        assert_eq!(clock.now(), instant(2024, 1, 3, 12));
    }
}
