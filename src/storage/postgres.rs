use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::errors::StoreError;
use crate::models::otp::OtpRecord;
use crate::storage::OtpStore;

/// OTP records in the `otp_codes` table, one row per email.
pub struct PgOtpStore {
    pool: PgPool,
}

impl PgOtpStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OtpStore for PgOtpStore {
    async fn fetch(&self, email: &str) -> Result<Option<OtpRecord>, StoreError> {
        let record = sqlx::query_as::<_, OtpRecord>(
            r#"
                SELECT email,
                       code,
                       code_expires_at,
                       verification_attempts,
                       max_verification_attempts,
                       rate_window_expires_at,
                       rate_window_issuance_count,
                       max_issuance_per_window,
                       is_verified,
                       last_issued_at
                FROM otp_codes
                WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn upsert(&self, record: &OtpRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
                INSERT INTO otp_codes (
                    email,
                    code,
                    code_expires_at,
                    verification_attempts,
                    max_verification_attempts,
                    rate_window_expires_at,
                    rate_window_issuance_count,
                    max_issuance_per_window,
                    is_verified,
                    last_issued_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (email)
                DO UPDATE SET
                    code = EXCLUDED.code,
                    code_expires_at = EXCLUDED.code_expires_at,
                    verification_attempts = EXCLUDED.verification_attempts,
                    max_verification_attempts = EXCLUDED.max_verification_attempts,
                    rate_window_expires_at = EXCLUDED.rate_window_expires_at,
                    rate_window_issuance_count = EXCLUDED.rate_window_issuance_count,
                    max_issuance_per_window = EXCLUDED.max_issuance_per_window,
                    is_verified = EXCLUDED.is_verified,
                    last_issued_at = EXCLUDED.last_issued_at
            "#,
        )
        .bind(&record.email)
        .bind(&record.code)
        .bind(record.code_expires_at)
        .bind(record.verification_attempts)
        .bind(record.max_verification_attempts)
        .bind(record.rate_window_expires_at)
        .bind(record.rate_window_issuance_count)
        .bind(record.max_issuance_per_window)
        .bind(record.is_verified)
        .bind(record.last_issued_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, email: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM otp_codes WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM otp_codes WHERE code_expires_at <= $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
