//! SMTP delivery via lettre

use crate::config::EmailConfig;
use crate::error::{WardenError, WardenResult};
use crate::types::Alert;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Mailer {
    cfg: EmailConfig,
}

impl Mailer {
    pub fn new(cfg: EmailConfig) -> Self {
        Self { cfg }
    }

    /// Compose and send the alert as plain text to every configured recipient
    pub async fn send(&self, alert: &Alert) -> WardenResult<()> {
        if !self.cfg.enabled || self.cfg.to.is_empty() {
            return Err(WardenError::ChannelUnavailable("email".into()));
        }

        let subject = format!(
            "[{}] Disk Warden: {}",
            alert.severity.as_str().to_uppercase(),
            alert.subject
        );
        let body = format!(
            "Disk Warden Alert\n\n\
             Severity: {}\n\
             Source: {} ({})\n\
             Subject: {}\n\n\
             {}\n\n\
             Timestamp: {}\n",
            alert.severity,
            alert.source_type,
            alert.source_id,
            alert.subject,
            alert.message,
            chrono::DateTime::from_timestamp(alert.timestamp, 0)
                .unwrap_or_default()
                .to_rfc3339(),
        );

        let mut builder = Message::builder()
            .from(
                self.cfg
                    .from
                    .parse()
                    .map_err(|e| WardenError::Smtp(format!("invalid from address: {e}")))?,
            )
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for to in &self.cfg.to {
            builder = builder.to(to
                .parse()
                .map_err(|e| WardenError::Smtp(format!("invalid recipient {to}: {e}")))?);
        }
        let message = builder
            .body(body)
            .map_err(|e| WardenError::Smtp(e.to_string()))?;

        let mut transport =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.cfg.smtp_server)
                .map_err(|e| WardenError::Smtp(e.to_string()))?
                .port(self.cfg.smtp_port)
                .timeout(Some(SMTP_TIMEOUT));
        if !self.cfg.username.is_empty() && !self.cfg.password.is_empty() {
            transport = transport.credentials(Credentials::new(
                self.cfg.username.clone(),
                self.cfg.password.clone(),
            ));
        }

        transport
            .build()
            .send(message)
            .await
            .map_err(|e| WardenError::Smtp(e.to_string()))?;
        Ok(())
    }
}
