//! Backend for the Commons community-services platform.
//!
//! The core is an email OTP manager (issue, verify, resend, expiry
//! sweep) with per-address rate limiting; signup and password-reset
//! flows are layered on top of it.

pub mod config;
pub mod controllers;
pub mod errors;
pub mod models;
pub mod service;
pub mod storage;
pub mod utils;
