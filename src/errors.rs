//! Error taxonomy for the OTP core and the auth flows built on it.
//!
//! Every variant of [`OtpError`] except `Store` is an expected,
//! client-facing condition: the HTTP layer turns each into a definitive
//! status and a `{ "success": false, "message": ... }` body so callers
//! can decide whether to wait, retry, or request a new code. Store
//! failures are the only programming-level faults and map to a generic
//! 500 with the detail kept in the logs.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("A valid email address is required")]
    InvalidEmail,

    #[error("Too many OTP requests. Please wait {retry_after_minutes} minute(s) before requesting again")]
    RateLimited { retry_after_minutes: i64 },

    #[error("Please wait {retry_after_seconds} second(s) before requesting a new OTP")]
    Cooldown { retry_after_seconds: i64 },

    #[error("No OTP found for this email. Please request a new one")]
    NotFound,

    #[error("This OTP has already been used")]
    AlreadyVerified,

    #[error("This OTP has expired. Please request a new one")]
    Expired,

    #[error("Too many failed attempts. Please request a new OTP")]
    AttemptsExceeded,

    #[error("Incorrect OTP. {remaining_attempts} attempt(s) remaining")]
    CodeMismatch { remaining_attempts: i32 },

    #[error("otp store failure: {0}")]
    Store(#[from] StoreError),
}

impl OtpError {
    fn public_message(&self) -> String {
        match self {
            OtpError::Store(_) => "Something went wrong. Please try again later".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for OtpError {
    fn status_code(&self) -> StatusCode {
        match self {
            OtpError::InvalidEmail
            | OtpError::AlreadyVerified
            | OtpError::Expired
            | OtpError::CodeMismatch { .. } => StatusCode::BAD_REQUEST,
            OtpError::RateLimited { .. } | OtpError::Cooldown { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            OtpError::NotFound => StatusCode::NOT_FOUND,
            OtpError::AttemptsExceeded => StatusCode::FORBIDDEN,
            OtpError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let OtpError::Store(err) = self {
            error!(error = %err, "otp store failure surfaced to client");
        }

        let mut body = json!({
            "success": false,
            "message": self.public_message(),
        });
        if let OtpError::CodeMismatch { remaining_attempts } = self {
            body["remainingAttempts"] = json!(remaining_attempts);
        }

        HttpResponse::build(self.status_code()).json(body)
    }
}

/// Failures of the signup / password-reset flows. OTP conditions pass
/// through untouched so their status mapping is identical on every
/// route that reaches the core.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Otp(#[from] OtpError),

    #[error("An account with this email already exists")]
    EmailTaken,

    #[error("No account found for this email")]
    UserNotFound,

    #[error("All fields are required")]
    MissingFields,

    #[error("{0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("user store failure: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl AuthError {
    fn public_message(&self) -> String {
        match self {
            AuthError::Database(_) | AuthError::Crypto(_) => {
                "Something went wrong. Please try again later".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Otp(inner) => inner.status_code(),
            AuthError::EmailTaken | AuthError::MissingFields | AuthError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Database(_) | AuthError::Crypto(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AuthError::Otp(inner) => inner.error_response(),
            AuthError::Database(err) => {
                error!(error = %err, "user store failure surfaced to client");
                internal_error_body(self)
            }
            AuthError::Crypto(err) => {
                error!(error = %err, "crypto failure surfaced to client");
                internal_error_body(self)
            }
            other => HttpResponse::build(other.status_code()).json(json!({
                "success": false,
                "message": other.public_message(),
            })),
        }
    }
}

fn internal_error_body(err: &AuthError) -> HttpResponse {
    HttpResponse::build(err.status_code()).json(json!({
        "success": false,
        "message": err.public_message(),
    }))
}

/// Storage-layer failure, shared by every [`OtpStore`](crate::storage::OtpStore)
/// implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("otp store query failed: {0}")]
    Backend(#[from] sqlx::Error),
}

/// Mail-dispatch failure. Callers on the issuance path log these and
/// carry on; the OTP counts as issued once its record is persisted.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid mailbox address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("smtp delivery failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("failed to load email template: {0}")]
    Template(#[from] std::io::Error),
}

/// Password-hashing failure. The argon2 error types are stringified the
/// same way the hashing service reports them.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid hashing parameters: {0}")]
    Params(String),

    #[error("failed to hash password: {0}")]
    Hash(String),

    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),

    #[error("password verification failed: {0}")]
    Verify(String),
}
