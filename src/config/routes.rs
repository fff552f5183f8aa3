use actix_web::web;

use crate::controllers::auth_controller;
use crate::controllers::otp_controller;

/// OTP issuance and verification, independent of the users table.
pub fn otp_routes(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/api/otp/request",
        web::post().to(otp_controller::request_otp),
    )
    .route(
        "/api/otp/resend",
        web::post().to(otp_controller::resend_otp),
    )
    .route(
        "/api/otp/verify",
        web::post().to(otp_controller::verify_otp),
    );
}

/// Signup and password-reset flows layered on the OTP core.
pub fn auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/api/auth/register",
        web::post().to(auth_controller::register),
    )
    .route(
        "/api/auth/verify",
        web::post().to(auth_controller::verify_signup),
    )
    .route(
        "/api/auth/forgot-password",
        web::post().to(auth_controller::forgot_password),
    )
    .route(
        "/api/auth/reset-password",
        web::post().to(auth_controller::reset_password),
    );
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    otp_routes(cfg);
    auth_routes(cfg);
}
