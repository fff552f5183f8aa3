use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware::Logger, web, App, HttpServer};
use color_eyre::Result;
use eyre::WrapErr;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use commons_backend::config::config::Config;
use commons_backend::config::crypto::CryptoService;
use commons_backend::config::routes::routes;
use commons_backend::service::email_service::EmailService;
use commons_backend::service::otp_service::OtpService;
use commons_backend::service::user_service::UserService;
use commons_backend::storage::PgOtpStore;
use commons_backend::utils::clock::SystemClock;

#[actix_web::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().wrap_err("Failed to load config")?;
    let pool = config
        .db_pool()
        .await
        .wrap_err("Failed to connect to database")?;

    let crypto = CryptoService;
    let mailer = EmailService::new(&config).wrap_err("Failed to build SMTP transport")?;
    let otp_service = Arc::new(OtpService::new(
        Arc::new(PgOtpStore::new(pool.clone())),
        Arc::new(mailer),
        Arc::new(SystemClock),
        crypto,
        config.otp.clone(),
    ));
    let user_service = Arc::new(UserService::new(pool, crypto, otp_service.clone()));

    let sweeper = otp_service.clone();
    let sweep_every = Duration::from_secs(config.sweep_interval_seconds);
    actix_web::rt::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        loop {
            ticker.tick().await;
            if let Err(err) = sweeper.sweep_expired().await {
                error!(error = %err, "expired OTP sweep failed");
            }
        }
    });

    let otp_data = web::Data::from(otp_service);
    let user_data = web::Data::from(user_service);

    info!(host = %config.host, port = config.port, "starting server");
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(otp_data.clone())
            .app_data(user_data.clone())
            .configure(routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
