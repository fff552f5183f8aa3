pub mod auth_controller;
pub mod otp_controller;
