use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Identity record touched by the signup and password-reset flows.
#[derive(Debug, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,

    // never serialized; reset flows overwrite it in place
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,

    #[serde(rename = "emailVerified")]
    pub email_verified: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewUser {
    #[validate(length(min = 3, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
}

#[cfg(test)]
mod tests {
    use validator::Validate;

    use super::NewUser;

    fn ok_user() -> NewUser {
        NewUser {
            name: "Asha Rao".into(),
            email: "asha@example.com".into(),
            password: "long enough".into(),
        }
    }

    #[test]
    fn new_user_validation_catches_short_passwords_and_bad_emails() {
        assert!(ok_user().validate().is_ok());

        let bad_email = NewUser {
            email: "not-an-email".into(),
            ..ok_user()
        };
        assert!(bad_email.validate().is_err());

        let short_password = NewUser {
            password: "short".into(),
            ..ok_user()
        };
        assert!(short_password.validate().is_err());
    }
}
