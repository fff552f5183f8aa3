//! Outbound email. Delivery is best-effort from the OTP core's
//! perspective: the issuance path logs a failed dispatch and carries on.

use std::fs;
use std::sync::Mutex;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::{json, Value};

use crate::config::config::Config;
use crate::errors::MailError;

/// The seam the OTP manager dispatches through.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_otp(&self, to: &str, code: &str, valid_minutes: i64) -> Result<(), MailError>;
}

/// SMTP-backed dispatcher. Renders the OTP template and hands the
/// result to `send`, which is the generic deliver-one-message surface.
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    platform_name: String,
    template_path: String,
}

impl EmailService {
    pub fn new(config: &Config) -> Result<Self, MailError> {
        let creds = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.clone(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
            .credentials(creds)
            .build();

        Ok(Self {
            mailer,
            from_address: config.smtp_username.clone(),
            platform_name: config.platform_name.clone(),
            template_path: config.otp_template_path.clone(),
        })
    }

    fn load_template(&self) -> Result<String, MailError> {
        Ok(fs::read_to_string(&self.template_path)?)
    }

    fn render(template: &str, data: &Value) -> String {
        let mut body = template.to_string();
        if let Some(fields) = data.as_object() {
            for (key, value) in fields {
                let placeholder = format!("{{{{{key}}}}}");
                body = body.replace(&placeholder, value.as_str().unwrap_or_default());
            }
        }
        body
    }

    pub async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        let email = Message::builder()
            .from(self.from_address.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())?;

        self.mailer.send(email).await?;

        Ok(())
    }
}

#[async_trait]
impl Mailer for EmailService {
    async fn send_otp(&self, to: &str, code: &str, valid_minutes: i64) -> Result<(), MailError> {
        let template = self.load_template()?;
        let body = Self::render(
            &template,
            &json!({
                "otp": code,
                "platformName": self.platform_name,
                "validMinutes": valid_minutes.to_string(),
            }),
        );

        self.send(to, "Verify Your Email", &body).await
    }
}

/// A dispatched OTP as seen by [`CapturingMailer`].
#[derive(Debug, Clone)]
pub struct SentOtp {
    pub to: String,
    pub code: String,
    pub valid_minutes: i64,
}

/// Test double that records every dispatch instead of sending it, so
/// tests can read back the code that was "delivered".
#[derive(Default)]
pub struct CapturingMailer {
    sent: Mutex<Vec<SentOtp>>,
}

impl CapturingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentOtp> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }

    /// The most recently dispatched code for `to`, if any.
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        self.sent
            .lock()
            .expect("mailer mutex poisoned")
            .iter()
            .rev()
            .find(|mail| mail.to == to)
            .map(|mail| mail.code.clone())
    }
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send_otp(&self, to: &str, code: &str, valid_minutes: i64) -> Result<(), MailError> {
        self.sent
            .lock()
            .expect("mailer mutex poisoned")
            .push(SentOtp {
                to: to.to_string(),
                code: code.to_string(),
                valid_minutes,
            });
        Ok(())
    }
}
