use std::time::Duration;

use color_eyre::Result;
use dotenv::dotenv;
use eyre::WrapErr;
use serde::Deserialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub platform_name: String,

    pub smtp_host: String,
    pub smtp_username: String,
    pub smtp_password: String,

    #[serde(default = "default_otp_template_path")]
    pub otp_template_path: String,

    /// How often the host process sweeps expired OTP records.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,

    /// OTP knobs, overridable per variable as `OTP__CODE_LENGTH` etc.
    #[serde(default)]
    pub otp: OtpSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        info!("Initializing configuration");
        let settings = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()
            .wrap_err("Building configuration")?;

        settings
            .try_deserialize()
            .wrap_err("loading configuration from environment")
    }

    pub async fn db_pool(&self) -> Result<PgPool> {
        info!("Initializing database pool");
        PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&self.database_url)
            .await
            .wrap_err("Creating database pool")
    }
}

/// The OTP manager's policy knobs, passed in at construction so tests
/// can tighten or loosen limits per case.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OtpSettings {
    /// Digits in a generated code.
    pub code_length: u32,
    /// How long a code stays valid after issuance.
    pub code_lifetime_seconds: i64,
    /// Failed verifications allowed before the record locks.
    pub max_verification_attempts: i32,
    /// Length of the issuance-counting window.
    pub rate_limit_window_seconds: i64,
    /// Issuances allowed within one window.
    pub max_issuance_per_window: i32,
    /// Minimum spacing between consecutive issuances.
    pub resend_cooldown_seconds: i64,
}

impl Default for OtpSettings {
    fn default() -> Self {
        Self {
            code_length: 5,
            code_lifetime_seconds: 300,
            max_verification_attempts: 5,
            rate_limit_window_seconds: 3600,
            max_issuance_per_window: 3,
            resend_cooldown_seconds: 60,
        }
    }
}

fn default_otp_template_path() -> String {
    "./templates/otp_email.html".to_string()
}

fn default_sweep_interval_seconds() -> u64 {
    300
}
