//! Webhook delivery

use crate::config::WebhookConfig;
use crate::error::{WardenError, WardenResult};
use crate::types::Alert;
use std::time::Duration;

pub struct WebhookSender {
    client: reqwest::Client,
    webhooks: Vec<WebhookConfig>,
}

impl WebhookSender {
    pub fn new(webhooks: Vec<WebhookConfig>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, webhooks }
    }

    /// POST the alert as JSON to the named webhook; success iff 2xx
    pub async fn send(&self, alert: &Alert, name: &str) -> WardenResult<()> {
        let url = self
            .webhooks
            .iter()
            .find(|w| w.name == name && !w.url.is_empty())
            .map(|w| w.url.clone())
            .ok_or_else(|| WardenError::ChannelUnavailable(format!("webhook:{name}")))?;

        let response = self
            .client
            .post(&url)
            .json(alert)
            .send()
            .await
            .map_err(|e| WardenError::Send(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WardenError::UnexpectedStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    #[tokio::test]
    async fn test_unknown_webhook_is_channel_unavailable() {
        let sender = WebhookSender::new(vec![]);
        let alert = Alert {
            id: 1,
            timestamp: 0,
            severity: Severity::Warning,
            source_type: "disk".into(),
            source_id: "/dev/sda".into(),
            subject: "x".into(),
            message: "y".into(),
            acknowledged: false,
        };
        let err = sender.send(&alert, "ops").await.unwrap_err();
        assert!(matches!(err, WardenError::ChannelUnavailable(_)));
    }
}
