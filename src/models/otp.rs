use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;

use crate::config::config::OtpSettings;

/// One active OTP per email address (the email is the record key,
/// already trimmed and lowercased by the caller).
///
/// The attempt and issuance ceilings are snapshotted from [`OtpSettings`]
/// when the record is created, so records issued under one configuration
/// keep their limits even if the environment changes underneath them.
#[derive(Debug, Clone, FromRow)]
pub struct OtpRecord {
    pub email: String,
    pub code: String,
    pub code_expires_at: DateTime<Utc>,
    pub verification_attempts: i32,
    pub max_verification_attempts: i32,
    pub rate_window_expires_at: DateTime<Utc>,
    pub rate_window_issuance_count: i32,
    pub max_issuance_per_window: i32,
    pub is_verified: bool,
    pub last_issued_at: DateTime<Utc>,
}

impl OtpRecord {
    /// Fresh record for a first issuance: the rate window opens now and
    /// this issuance is the first one counted against it.
    pub fn issued(email: String, code: String, now: DateTime<Utc>, settings: &OtpSettings) -> Self {
        Self {
            email,
            code,
            code_expires_at: now + Duration::seconds(settings.code_lifetime_seconds),
            verification_attempts: 0,
            max_verification_attempts: settings.max_verification_attempts,
            rate_window_expires_at: now + Duration::seconds(settings.rate_limit_window_seconds),
            rate_window_issuance_count: 1,
            max_issuance_per_window: settings.max_issuance_per_window,
            is_verified: false,
            last_issued_at: now,
        }
    }

    /// Put a new code on an existing record. Clears the attempt counter
    /// and the verified flag; counts against the current rate window.
    pub fn reissue(&mut self, code: String, now: DateTime<Utc>, lifetime: Duration) {
        self.code = code;
        self.code_expires_at = now + lifetime;
        self.verification_attempts = 0;
        self.is_verified = false;
        self.rate_window_issuance_count += 1;
        self.last_issued_at = now;
    }

    /// Open a fresh rate window ending at `expires_at` with nothing
    /// counted against it yet.
    pub fn reset_window(&mut self, expires_at: DateTime<Utc>) {
        self.rate_window_issuance_count = 0;
        self.rate_window_expires_at = expires_at;
    }

    /// Count a failed verification and return how many attempts remain.
    pub fn record_failed_attempt(&mut self) -> i32 {
        self.verification_attempts += 1;
        self.remaining_attempts()
    }

    pub fn remaining_attempts(&self) -> i32 {
        (self.max_verification_attempts - self.verification_attempts).max(0)
    }

    // The code is invalid from the expiry instant onward.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.code_expires_at
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.verification_attempts >= self.max_verification_attempts
    }

    pub fn window_elapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.rate_window_expires_at
    }

    pub fn window_exhausted(&self) -> bool {
        self.rate_window_issuance_count >= self.max_issuance_per_window
    }

    /// Time left in the current rate window, in minutes rounded up.
    pub fn window_remaining_minutes(&self, now: DateTime<Utc>) -> i64 {
        minutes_ceil(self.rate_window_expires_at - now)
    }

    pub fn in_cooldown(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        now < self.last_issued_at + cooldown
    }

    /// Time until the cooldown lifts, in seconds rounded up.
    pub fn cooldown_remaining_seconds(&self, now: DateTime<Utc>, cooldown: Duration) -> i64 {
        seconds_ceil(self.last_issued_at + cooldown - now)
    }
}

fn seconds_ceil(d: Duration) -> i64 {
    (d.num_milliseconds() + 999).div_euclid(1000)
}

fn minutes_ceil(d: Duration) -> i64 {
    (seconds_ceil(d) + 59).div_euclid(60)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn record() -> OtpRecord {
        OtpRecord::issued(
            "a@b.com".into(),
            "12345".into(),
            t0(),
            &OtpSettings::default(),
        )
    }

    #[test]
    fn fresh_record_counts_its_own_issuance() {
        let rec = record();
        assert_eq!(rec.verification_attempts, 0);
        assert_eq!(rec.rate_window_issuance_count, 1);
        assert!(!rec.is_verified);
        assert_eq!(rec.code_expires_at, t0() + Duration::seconds(300));
        assert_eq!(rec.rate_window_expires_at, t0() + Duration::seconds(3600));
    }

    #[test]
    fn reissue_resets_attempts_and_counts_against_window() {
        let mut rec = record();
        rec.verification_attempts = 3;
        rec.is_verified = true;

        let later = t0() + Duration::seconds(120);
        rec.reissue("99999".into(), later, Duration::seconds(300));

        assert_eq!(rec.code, "99999");
        assert_eq!(rec.verification_attempts, 0);
        assert!(!rec.is_verified);
        assert_eq!(rec.rate_window_issuance_count, 2);
        assert_eq!(rec.last_issued_at, later);
        assert_eq!(rec.code_expires_at, later + Duration::seconds(300));
    }

    #[test]
    fn expiry_boundary_is_exclusive_of_the_last_instant() {
        let rec = record();
        assert!(!rec.is_expired(t0() + Duration::seconds(299)));
        assert!(rec.is_expired(t0() + Duration::seconds(300)));
    }

    #[test]
    fn remaining_attempts_floors_at_zero() {
        let mut rec = record();
        for expected in [4, 3, 2, 1, 0] {
            assert_eq!(rec.record_failed_attempt(), expected);
        }
        assert!(rec.attempts_exhausted());
        rec.verification_attempts += 1;
        assert_eq!(rec.remaining_attempts(), 0);
    }

    #[test]
    fn window_remaining_rounds_up_to_whole_minutes() {
        let rec = record();
        let near_end = rec.rate_window_expires_at - Duration::seconds(61);
        assert_eq!(rec.window_remaining_minutes(near_end), 2);
        let last_minute = rec.rate_window_expires_at - Duration::seconds(60);
        assert_eq!(rec.window_remaining_minutes(last_minute), 1);
        let sub_second = rec.rate_window_expires_at - Duration::milliseconds(500);
        assert_eq!(rec.window_remaining_minutes(sub_second), 1);
    }

    #[test]
    fn cooldown_remaining_rounds_up_to_whole_seconds() {
        let rec = record();
        let cooldown = Duration::seconds(60);
        assert!(rec.in_cooldown(t0() + Duration::seconds(59), cooldown));
        assert!(!rec.in_cooldown(t0() + Duration::seconds(60), cooldown));
        assert_eq!(
            rec.cooldown_remaining_seconds(t0() + Duration::seconds(10), cooldown),
            50
        );
        assert_eq!(
            rec.cooldown_remaining_seconds(t0() + Duration::milliseconds(59_500), cooldown),
            1
        );
    }
}
