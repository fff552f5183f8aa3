use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::controllers::otp_controller::CodeField;
use crate::errors::AuthError;
use crate::models::user::NewUser;
use crate::service::user_service::UserService;

#[derive(Deserialize)]
pub struct RegisterBody {
    pub name: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct VerifySignupBody {
    pub name: String,
    pub email: String,
    pub password: String,
    pub code: CodeField,
}

#[derive(Deserialize)]
pub struct ForgotPasswordBody {
    pub email: String,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordBody {
    pub email: String,
    pub code: CodeField,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

pub async fn register(
    user_service: web::Data<UserService>,
    body: web::Json<RegisterBody>,
) -> Result<HttpResponse, AuthError> {
    if body.name.trim().is_empty() || body.email.trim().is_empty() {
        return Err(AuthError::MissingFields);
    }

    let issued = user_service.begin_registration(&body.email).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "OTP sent to email. Please verify your account",
        "expiresInSeconds": issued.expires_in_seconds,
    })))
}

pub async fn verify_signup(
    user_service: web::Data<UserService>,
    body: web::Json<VerifySignupBody>,
) -> Result<HttpResponse, AuthError> {
    let code = body.code.as_string();
    if body.name.trim().is_empty()
        || body.email.trim().is_empty()
        || body.password.trim().is_empty()
        || code.trim().is_empty()
    {
        return Err(AuthError::MissingFields);
    }

    let new_user = NewUser {
        name: body.name.clone(),
        email: body.email.clone(),
        password: body.password.clone(),
    };
    user_service.complete_registration(new_user, &code).await?;

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "User registered successfully",
    })))
}

pub async fn forgot_password(
    user_service: web::Data<UserService>,
    body: web::Json<ForgotPasswordBody>,
) -> Result<HttpResponse, AuthError> {
    if body.email.trim().is_empty() {
        return Err(AuthError::MissingFields);
    }

    let issued = user_service.forgot_password(&body.email).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "OTP sent to email",
        "expiresInSeconds": issued.expires_in_seconds,
    })))
}

pub async fn reset_password(
    user_service: web::Data<UserService>,
    body: web::Json<ResetPasswordBody>,
) -> Result<HttpResponse, AuthError> {
    let code = body.code.as_string();
    if body.email.trim().is_empty() || code.trim().is_empty() || body.new_password.trim().is_empty()
    {
        return Err(AuthError::MissingFields);
    }
    body.validate()?;

    user_service
        .reset_password(&body.email, &code, &body.new_password)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Password reset successfully",
    })))
}
