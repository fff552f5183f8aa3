use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::errors::OtpError;
use crate::service::otp_service::OtpService;

#[derive(Deserialize)]
pub struct RequestOtpBody {
    pub email: String,
}

/// Some clients send the code as a JSON number instead of a string.
/// Accept both; a number is used through its decimal rendering.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CodeField {
    Text(String),
    Number(u64),
}

impl CodeField {
    pub fn as_string(&self) -> String {
        match self {
            CodeField::Text(code) => code.clone(),
            CodeField::Number(code) => code.to_string(),
        }
    }
}

#[derive(Deserialize)]
pub struct VerifyOtpBody {
    pub email: String,
    pub code: CodeField,
}

pub async fn request_otp(
    otp_service: web::Data<OtpService>,
    body: web::Json<RequestOtpBody>,
) -> Result<HttpResponse, OtpError> {
    let issued = otp_service.issue(&body.email).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "expiresInSeconds": issued.expires_in_seconds,
    })))
}

pub async fn resend_otp(
    otp_service: web::Data<OtpService>,
    body: web::Json<RequestOtpBody>,
) -> Result<HttpResponse, OtpError> {
    let issued = otp_service.resend(&body.email).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "expiresInSeconds": issued.expires_in_seconds,
    })))
}

pub async fn verify_otp(
    otp_service: web::Data<OtpService>,
    body: web::Json<VerifyOtpBody>,
) -> Result<HttpResponse, OtpError> {
    otp_service
        .verify(&body.email, &body.code.as_string())
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}
