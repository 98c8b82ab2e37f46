//! Daily quota records and window arithmetic.
//!
//! Windows are calendar days in one fixed reference timezone so every client
//! agrees on when a day ends, whatever its local clock says.

use std::num::NonZeroU32;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

pub use pagesmith_api_types::{IdentityClass, QuotaState};

/// Who is being counted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Client-generated key; weak by nature, reset by clearing client storage.
    Anonymous(String),
    /// User asserted by the sign-in gateway.
    Authenticated(String),
}

impl Identity {
    pub fn class(&self) -> IdentityClass {
        match self {
            Identity::Anonymous(_) => IdentityClass::Anonymous,
            Identity::Authenticated(_) => IdentityClass::Authenticated,
        }
    }

    /// Store key; the class prefix keeps an anonymous key from ever colliding
    /// with a user name.
    pub fn key(&self) -> String {
        match self {
            Identity::Anonymous(key) => format!("anon:{key}"),
            Identity::Authenticated(user) => format!("user:{user}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub anonymous: NonZeroU32,
    pub authenticated: NonZeroU32,
}

impl QuotaLimits {
    pub fn for_class(&self, class: IdentityClass) -> u32 {
        match class {
            IdentityClass::Anonymous => self.anonymous.get(),
            IdentityClass::Authenticated => self.authenticated.get(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaRecord {
    pub identity_key: String,
    pub window_date: NaiveDate,
    pub used_count: u32,
    pub limit: u32,
}

impl QuotaRecord {
    pub fn fresh(identity_key: impl Into<String>, window_date: NaiveDate, limit: u32) -> Self {
        Self {
            identity_key: identity_key.into(),
            window_date,
            used_count: 0,
            limit,
        }
    }

    /// Reset the counter when the record belongs to an earlier window.
    pub fn roll_window(&mut self, window_date: NaiveDate) -> bool {
        if self.window_date == window_date {
            return false;
        }
        self.used_count = 0;
        self.window_date = window_date;
        true
    }

    /// Count one use, saturating at the limit. Returns whether the use counted.
    pub fn record_use(&mut self) -> bool {
        if self.used_count >= self.limit {
            self.used_count = self.limit;
            return false;
        }
        self.used_count += 1;
        true
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used_count)
    }

    pub fn state(&self) -> QuotaState {
        if self.used_count >= self.limit {
            QuotaState::Exhausted
        } else {
            QuotaState::WithinLimit
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaWindow {
    timezone: Tz,
}

impl QuotaWindow {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn window_of(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    pub fn roll(&self, record: &mut QuotaRecord, now: DateTime<Utc>) -> bool {
        record.roll_window(self.window_of(now))
    }

    /// Seconds until the next window starts, never less than one.
    pub fn seconds_until_rollover(&self, now: DateTime<Utc>) -> u64 {
        let today = self.window_of(now);
        let next_start = today
            .succ_opt()
            .and_then(|tomorrow| self.start_of(tomorrow))
            .unwrap_or_else(|| now + Duration::days(1));
        let seconds = (next_start - now).num_seconds();
        u64::try_from(seconds).unwrap_or(0).max(1)
    }

    fn start_of(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        // A DST gap can swallow midnight; the first representable hour starts the day then.
        (0..3).find_map(|hour| {
            let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
            self.timezone
                .from_local_datetime(&date.and_time(time))
                .earliest()
                .map(|local| local.with_timezone(&Utc))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn window_follows_reference_timezone_not_utc() {
        let window = QuotaWindow::new(chrono_tz::Asia::Seoul);
        // 15:30 UTC is already 00:30 the next day in Seoul.
        let now = utc("2026-03-01T15:30:00Z");
        assert_eq!(
            window.window_of(now),
            NaiveDate::from_ymd_opt(2026, 3, 2).expect("date")
        );
    }

    #[test]
    fn rollover_countdown_reaches_next_local_midnight() {
        let window = QuotaWindow::new(chrono_tz::Asia::Seoul);
        let now = utc("2026-03-01T14:00:00Z"); // 23:00 in Seoul
        assert_eq!(window.seconds_until_rollover(now), 3600);
    }

    #[test]
    fn rollover_countdown_handles_dst_transitions() {
        let window = QuotaWindow::new(chrono_tz::America::Sao_Paulo);
        let now = utc("2026-03-01T12:00:00Z");
        let seconds = window.seconds_until_rollover(now);
        assert!(seconds > 0 && seconds <= 25 * 3600);
    }

    #[test]
    fn roll_window_resets_only_stale_records() {
        let day = NaiveDate::from_ymd_opt(2026, 5, 4).expect("date");
        let mut record = QuotaRecord::fresh("user:a", day, 3);
        record.record_use();
        assert!(!record.roll_window(day));
        assert_eq!(record.used_count, 1);

        let next = day.succ_opt().expect("next day");
        assert!(record.roll_window(next));
        assert_eq!(record.used_count, 0);
        assert_eq!(record.window_date, next);
    }

    #[test]
    fn record_use_saturates_at_limit() {
        let day = NaiveDate::from_ymd_opt(2026, 5, 4).expect("date");
        let mut record = QuotaRecord::fresh("anon:x", day, 2);
        assert!(record.record_use());
        assert!(record.record_use());
        assert!(!record.record_use());
        assert_eq!(record.used_count, 2);
        assert_eq!(record.remaining(), 0);
        assert_eq!(record.state(), QuotaState::Exhausted);
    }

    #[test]
    fn identity_keys_are_namespaced_by_class() {
        let anon = Identity::Anonymous("alice".to_string());
        let user = Identity::Authenticated("alice".to_string());
        assert_ne!(anon.key(), user.key());
        assert_eq!(anon.class(), IdentityClass::Anonymous);
        assert_eq!(user.class(), IdentityClass::Authenticated);
    }
}
