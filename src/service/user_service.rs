use std::sync::Arc;

use sqlx::{Error as SqlxError, PgPool};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::config::crypto::CryptoService;
use crate::errors::AuthError;
use crate::models::user::{NewUser, User};
use crate::service::otp_service::{IssuedOtp, OtpService};
use crate::utils::normalize_email;

/// Account flows built on top of the OTP manager: registration and
/// password reset both prove ownership of the address before touching
/// the users table.
pub struct UserService {
    pool: PgPool,
    crypto: CryptoService,
    otp: Arc<OtpService>,
}

impl UserService {
    pub fn new(pool: PgPool, crypto: CryptoService, otp: Arc<OtpService>) -> Self {
        Self { pool, crypto, otp }
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(
            r#"
                SELECT id, name, email, password_hash, email_verified, created_at, updated_at
                FROM users
                WHERE email = $1
            "#,
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// First half of signup: refuse taken addresses, then send a code.
    pub async fn begin_registration(&self, email: &str) -> Result<IssuedOtp, AuthError> {
        let email = normalize_email(email);
        if self.get_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }
        Ok(self.otp.issue(&email).await?)
    }

    /// Second half of signup: the code must verify before the row is
    /// created. The unique index on email backstops the pre-check for
    /// two signups racing on the same address.
    pub async fn complete_registration(
        &self,
        new_user: NewUser,
        code: &str,
    ) -> Result<User, AuthError> {
        new_user.validate()?;
        let email = normalize_email(&new_user.email);

        if self.get_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }
        self.otp.verify(&email, code).await?;

        let password_hash = self.crypto.hash_password(&new_user.password)?;
        let result = sqlx::query_as::<_, User>(
            r#"
                INSERT INTO users (id, name, email, password_hash, email_verified, created_at, updated_at)
                VALUES ($1, $2, $3, $4, true, NOW(), NOW())
                RETURNING id, name, email, password_hash, email_verified, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new_user.name.trim())
        .bind(&email)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => {
                info!(email = %user.email, user_id = %user.id, "registered user");
                Ok(user)
            }
            Err(SqlxError::Database(db_err)) if db_err.is_unique_violation() => {
                Err(AuthError::EmailTaken)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Send a reset code, but only to addresses that have an account.
    pub async fn forgot_password(&self, email: &str) -> Result<IssuedOtp, AuthError> {
        let email = normalize_email(email);
        if self.get_user_by_email(&email).await?.is_none() {
            return Err(AuthError::UserNotFound);
        }
        Ok(self.otp.issue(&email).await?)
    }

    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let email = normalize_email(email);
        if self.get_user_by_email(&email).await?.is_none() {
            return Err(AuthError::UserNotFound);
        }
        self.otp.verify(&email, code).await?;

        let password_hash = self.crypto.hash_password(new_password)?;
        sqlx::query(
            r#"
                UPDATE users
                SET password_hash = $1, updated_at = NOW()
                WHERE email = $2
            "#,
        )
        .bind(&password_hash)
        .bind(&email)
        .execute(&self.pool)
        .await?;

        info!(email = %email, "password reset");
        Ok(())
    }
}
