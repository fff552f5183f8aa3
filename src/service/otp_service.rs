//! The OTP manager: issues one-time codes bound to an email address,
//! enforces expiry, attempt and rate limits, and validates submissions.
//!
//! Consistency model: every operation reads the whole record, mutates
//! it in memory and writes the whole record back. Two racing requests
//! for the same email resolve last-writer-wins; the store offers no
//! compare-and-set and none is assumed. No in-process lock is taken, so
//! requests for different emails never contend.

use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};
use validator::ValidateEmail;

use crate::config::config::OtpSettings;
use crate::config::crypto::CryptoService;
use crate::errors::OtpError;
use crate::models::otp::OtpRecord;
use crate::service::email_service::Mailer;
use crate::storage::OtpStore;
use crate::utils::clock::Clock;
use crate::utils::normalize_email;

/// Successful issuance, as reported to the caller. The code itself goes
/// out only through the mailer.
#[derive(Debug, Clone)]
pub struct IssuedOtp {
    pub expires_in_seconds: i64,
}

pub struct OtpService {
    store: Arc<dyn OtpStore>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    crypto: CryptoService,
    settings: OtpSettings,
}

impl OtpService {
    pub fn new(
        store: Arc<dyn OtpStore>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        crypto: CryptoService,
        settings: OtpSettings,
    ) -> Self {
        Self {
            store,
            mailer,
            clock,
            crypto,
            settings,
        }
    }

    /// Issue a fresh code for `email`, creating or replacing its record.
    ///
    /// Guard order: rate window first, then cooldown. An email that is
    /// both over its window quota and inside the cooldown reports
    /// `RateLimited`. Mail dispatch is best-effort; the code counts as
    /// issued once the record is persisted.
    pub async fn issue(&self, email: &str) -> Result<IssuedOtp, OtpError> {
        let email = normalize_email(email);
        if !email.validate_email() {
            return Err(OtpError::InvalidEmail);
        }

        let now = self.clock.now();
        let window = Duration::seconds(self.settings.rate_limit_window_seconds);
        let cooldown = Duration::seconds(self.settings.resend_cooldown_seconds);
        let lifetime = Duration::seconds(self.settings.code_lifetime_seconds);

        let mut existing = self.store.fetch(&email).await?;
        if let Some(record) = existing.as_mut() {
            // Rate window
            if record.window_elapsed(now) {
                record.reset_window(now + window);
            } else if record.window_exhausted() {
                return Err(OtpError::RateLimited {
                    retry_after_minutes: record.window_remaining_minutes(now),
                });
            }

            // Cooldown
            if record.in_cooldown(now, cooldown) {
                return Err(OtpError::Cooldown {
                    retry_after_seconds: record.cooldown_remaining_seconds(now, cooldown),
                });
            }
        }

        let code = self.crypto.generate_otp_code(self.settings.code_length);
        let record = match existing {
            Some(mut record) => {
                record.reissue(code, now, lifetime);
                record
            }
            None => OtpRecord::issued(email, code, now, &self.settings),
        };

        self.store.upsert(&record).await?;

        let valid_minutes = (self.settings.code_lifetime_seconds + 59) / 60;
        if let Err(err) = self
            .mailer
            .send_otp(&record.email, &record.code, valid_minutes)
            .await
        {
            // the record is already persisted; delivery is best-effort
            warn!(email = %record.email, error = %err, "failed to dispatch OTP email");
        }

        info!(email = %record.email, "issued OTP");
        Ok(IssuedOtp {
            expires_in_seconds: self.settings.code_lifetime_seconds,
        })
    }

    /// Same contract and counters as [`issue`](Self::issue); a resend is
    /// just the next issuance.
    pub async fn resend(&self, email: &str) -> Result<IssuedOtp, OtpError> {
        self.issue(email).await
    }

    /// Check `submitted` against the active code for `email`.
    ///
    /// Verification is single-use: on a match the record is marked
    /// verified, persisted, then deleted, so the next call lands on
    /// `NotFound`.
    pub async fn verify(&self, email: &str, submitted: &str) -> Result<(), OtpError> {
        let email = normalize_email(email);
        let submitted = submitted.trim();
        let now = self.clock.now();

        let mut record = self
            .store
            .fetch(&email)
            .await?
            .ok_or(OtpError::NotFound)?;

        if record.is_verified {
            return Err(OtpError::AlreadyVerified);
        }

        // Expired
        if record.is_expired(now) {
            return Err(OtpError::Expired);
        }

        // Locked
        if record.attempts_exhausted() {
            return Err(OtpError::AttemptsExceeded);
        }

        // Wrong code
        if submitted != record.code {
            let remaining_attempts = record.record_failed_attempt();
            self.store.upsert(&record).await?;
            return Err(OtpError::CodeMismatch { remaining_attempts });
        }

        record.is_verified = true;
        self.store.upsert(&record).await?;
        self.store.delete(&email).await?;

        info!(email = %email, "OTP verified");
        Ok(())
    }

    /// Delete every record whose code has expired. Idempotent; invoked
    /// on an interval owned by the host process, never from here.
    pub async fn sweep_expired(&self) -> Result<u64, OtpError> {
        let cutoff = self.clock.now();
        let removed = self.store.sweep_expired(cutoff).await?;
        if removed > 0 {
            info!(removed, "swept expired OTP records");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    use crate::errors::MailError;
    use crate::service::email_service::CapturingMailer;
    use crate::storage::MemoryOtpStore;
    use crate::utils::clock::ManualClock;

    use super::*;

    const EMAIL: &str = "a@b.com";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    struct Harness {
        service: OtpService,
        store: Arc<MemoryOtpStore>,
        mailer: Arc<CapturingMailer>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        harness_with(OtpSettings::default())
    }

    fn harness_with(settings: OtpSettings) -> Harness {
        let store = Arc::new(MemoryOtpStore::new());
        let mailer = Arc::new(CapturingMailer::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let service = OtpService::new(
            store.clone(),
            mailer.clone(),
            clock.clone(),
            CryptoService,
            settings,
        );
        Harness {
            service,
            store,
            mailer,
            clock,
        }
    }

    impl Harness {
        async fn issue(&self) -> IssuedOtp {
            self.service.issue(EMAIL).await.expect("issue failed")
        }

        fn delivered_code(&self) -> String {
            self.mailer
                .last_code_for(EMAIL)
                .expect("no OTP email dispatched")
        }

        /// A code guaranteed not to match the active one.
        fn wrong_code(&self) -> &'static str {
            if self.delivered_code() == "00000" {
                "99999"
            } else {
                "00000"
            }
        }
    }

    #[tokio::test]
    async fn issue_then_verify_is_single_use() {
        let h = harness();

        let issued = h.issue().await;
        assert_eq!(issued.expires_in_seconds, 300);

        let code = h.delivered_code();
        h.service.verify(EMAIL, &code).await.unwrap();
        assert!(h.store.is_empty().await, "record should be gone after use");

        // the same code a second time behaves as if nothing was issued
        assert!(matches!(
            h.service.verify(EMAIL, &code).await,
            Err(OtpError::NotFound)
        ));
    }

    #[tokio::test]
    async fn rejects_syntactically_invalid_emails() {
        let h = harness();
        assert!(matches!(
            h.service.issue("not-an-email").await,
            Err(OtpError::InvalidEmail)
        ));
        assert!(matches!(
            h.service.issue("   ").await,
            Err(OtpError::InvalidEmail)
        ));
        assert!(h.store.is_empty().await);
        assert!(h.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn email_key_is_case_insensitive_and_trimmed() {
        let h = harness();
        h.service.issue("  USER@Example.COM ").await.unwrap();

        let record = h.store.fetch("user@example.com").await.unwrap();
        assert!(record.is_some(), "record stored under normalized key");

        let code = h.mailer.last_code_for("user@example.com").unwrap();
        h.service.verify("User@example.COM  ", &code).await.unwrap();
    }

    #[tokio::test]
    async fn second_issue_within_cooldown_is_rejected_with_remaining_seconds() {
        let h = harness();
        h.issue().await;

        h.clock.advance(Duration::seconds(10));
        match h.service.issue(EMAIL).await {
            Err(OtpError::Cooldown {
                retry_after_seconds,
            }) => assert_eq!(retry_after_seconds, 50),
            other => panic!("expected Cooldown, got {other:?}"),
        }

        // exactly at the cooldown boundary the next issue goes through
        h.clock.advance(Duration::seconds(50));
        h.issue().await;
    }

    #[tokio::test]
    async fn fourth_issuance_in_window_is_rate_limited() {
        let h = harness();

        for _ in 0..3 {
            h.issue().await;
            h.clock.advance(Duration::seconds(60));
        }

        match h.service.issue(EMAIL).await {
            Err(OtpError::RateLimited {
                retry_after_minutes,
            }) => {
                assert!(retry_after_minutes > 0);
                // window opened at t0; 180s have passed
                assert_eq!(retry_after_minutes, 57);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn window_reset_allows_issuance_again() {
        let h = harness();
        for _ in 0..3 {
            h.issue().await;
            h.clock.advance(Duration::seconds(60));
        }
        assert!(h.service.issue(EMAIL).await.is_err());

        // jump past the end of the window
        h.clock.set(t0() + Duration::seconds(3601));
        h.issue().await;

        let record = h.store.fetch(EMAIL).await.unwrap().unwrap();
        assert_eq!(record.rate_window_issuance_count, 1);
        assert_eq!(
            record.rate_window_expires_at,
            h.clock.now() + Duration::seconds(3600)
        );
    }

    #[tokio::test]
    async fn wrong_codes_count_down_then_the_correct_one_succeeds() {
        let h = harness();
        h.issue().await;

        let record = h.store.fetch(EMAIL).await.unwrap().unwrap();
        assert_eq!(record.verification_attempts, 0);
        assert_eq!(record.rate_window_issuance_count, 1);

        let wrong = h.wrong_code();
        for expected_remaining in [4, 3, 2] {
            match h.service.verify(EMAIL, wrong).await {
                Err(OtpError::CodeMismatch { remaining_attempts }) => {
                    assert_eq!(remaining_attempts, expected_remaining)
                }
                other => panic!("expected CodeMismatch, got {other:?}"),
            }
        }

        let code = h.delivered_code();
        h.service.verify(EMAIL, &code).await.unwrap();
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn exhausted_attempts_lock_out_even_the_correct_code() {
        let h = harness();
        h.issue().await;

        let wrong = h.wrong_code();
        for _ in 0..5 {
            let _ = h.service.verify(EMAIL, wrong).await;
        }

        let code = h.delivered_code();
        assert!(matches!(
            h.service.verify(EMAIL, &code).await,
            Err(OtpError::AttemptsExceeded)
        ));
    }

    #[tokio::test]
    async fn reissue_unlocks_an_attempts_exhausted_record() {
        let h = harness();
        h.issue().await;

        let wrong = h.wrong_code();
        for _ in 0..5 {
            let _ = h.service.verify(EMAIL, wrong).await;
        }

        h.clock.advance(Duration::seconds(61));
        h.issue().await;

        let code = h.delivered_code();
        h.service.verify(EMAIL, &code).await.unwrap();
    }

    #[tokio::test]
    async fn expired_code_is_rejected_no_matter_how_correct() {
        let h = harness();
        h.issue().await;
        let code = h.delivered_code();

        h.clock.advance(Duration::seconds(300));
        assert!(matches!(
            h.service.verify(EMAIL, &code).await,
            Err(OtpError::Expired)
        ));
    }

    #[tokio::test]
    async fn verify_without_any_record_is_not_found() {
        let h = harness();
        assert!(matches!(
            h.service.verify(EMAIL, "12345").await,
            Err(OtpError::NotFound)
        ));
    }

    #[tokio::test]
    async fn already_verified_record_rejects_reverification() {
        let h = harness();

        // simulate a success whose cleanup never landed
        let mut record = OtpRecord::issued(
            EMAIL.to_string(),
            "12345".to_string(),
            t0(),
            &OtpSettings::default(),
        );
        record.is_verified = true;
        h.store.upsert(&record).await.unwrap();

        assert!(matches!(
            h.service.verify(EMAIL, "12345").await,
            Err(OtpError::AlreadyVerified)
        ));
    }

    #[tokio::test]
    async fn submitted_codes_are_trimmed_before_comparison() {
        let h = harness();
        h.issue().await;
        let code = h.delivered_code();
        h.service.verify(EMAIL, &format!("  {code} ")).await.unwrap();
    }

    #[tokio::test]
    async fn resend_shares_the_issue_counters() {
        let h = harness();
        h.issue().await;

        // a resend straight away hits the same cooldown
        assert!(matches!(
            h.service.resend(EMAIL).await,
            Err(OtpError::Cooldown { .. })
        ));

        h.clock.advance(Duration::seconds(60));
        h.service.resend(EMAIL).await.unwrap();
        let record = h.store.fetch(EMAIL).await.unwrap().unwrap();
        assert_eq!(record.rate_window_issuance_count, 2);
    }

    #[tokio::test]
    async fn reissue_replaces_the_code_and_resets_attempts() {
        let h = harness();
        h.issue().await;
        let first = h.delivered_code();
        let _ = h.service.verify(EMAIL, h.wrong_code()).await;
        let _ = h.service.verify(EMAIL, h.wrong_code()).await;

        h.clock.advance(Duration::seconds(61));
        h.issue().await;

        let record = h.store.fetch(EMAIL).await.unwrap().unwrap();
        assert_eq!(record.verification_attempts, 0);

        // the first code only still works if the reissue collided with it,
        // which the record itself rules out
        let second = h.delivered_code();
        if first != second {
            assert!(matches!(
                h.service.verify(EMAIL, &first).await,
                Err(OtpError::CodeMismatch { .. })
            ));
        }
        h.service.verify(EMAIL, &second).await.unwrap();
    }

    #[tokio::test]
    async fn sweep_removes_expired_records_only() {
        let h = harness();
        h.service.issue("old@b.com").await.unwrap();

        h.clock.advance(Duration::seconds(200));
        h.service.issue("new@b.com").await.unwrap();

        // old: expires at t0+300; new: expires at t0+500
        h.clock.set(t0() + Duration::seconds(400));
        let removed = h.service.sweep_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert!(h.store.fetch("old@b.com").await.unwrap().is_none());
        assert!(h.store.fetch("new@b.com").await.unwrap().is_some());

        // sweeping again finds nothing
        assert_eq!(h.service.sweep_expired().await.unwrap(), 0);
    }

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send_otp(&self, _: &str, _: &str, _: i64) -> Result<(), MailError> {
            Err(MailError::Template(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "template missing",
            )))
        }
    }

    #[tokio::test]
    async fn mail_dispatch_failure_does_not_fail_issuance() {
        let store = Arc::new(MemoryOtpStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let service = OtpService::new(
            store.clone(),
            Arc::new(FailingMailer),
            clock,
            CryptoService,
            OtpSettings::default(),
        );

        let issued = service.issue(EMAIL).await.unwrap();
        assert_eq!(issued.expires_in_seconds, 300);
        assert!(store.fetch(EMAIL).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn settings_overrides_apply_per_instance() {
        let h = harness_with(OtpSettings {
            code_length: 6,
            code_lifetime_seconds: 120,
            max_verification_attempts: 2,
            max_issuance_per_window: 1,
            ..OtpSettings::default()
        });

        let issued = h.issue().await;
        assert_eq!(issued.expires_in_seconds, 120);
        assert_eq!(h.delivered_code().len(), 6);

        let wrong = h.wrong_code();
        let _ = h.service.verify(EMAIL, wrong).await;
        let _ = h.service.verify(EMAIL, wrong).await;
        assert!(matches!(
            h.service.verify(EMAIL, wrong).await,
            Err(OtpError::AttemptsExceeded)
        ));

        // window quota of one: the next issue inside the window is refused
        h.clock.advance(Duration::seconds(61));
        assert!(matches!(
            h.service.issue(EMAIL).await,
            Err(OtpError::RateLimited { .. })
        ));
    }
}
