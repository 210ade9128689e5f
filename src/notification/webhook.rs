use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument};

use crate::config::Webhook;

use super::{DeliveryError, Notifier, post_json};

/// Delivery as a JSON POST to an arbitrary URL
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    webhook: Webhook,
}

impl WebhookNotifier {
    pub fn new(client: Client, webhook: Webhook) -> Self {
        Self { client, webhook }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    #[instrument(skip_all)]
    async fn send_alert(&self, message: &str) -> Result<(), DeliveryError> {
        if self.webhook.url.is_empty() {
            return Err(DeliveryError::NotConfigured(self.name().to_string()));
        }

        let payload = json!({
            "message": message,
            "timestamp": Utc::now().to_rfc3339()
        });

        let status = post_json(self.client.post(&self.webhook.url), &payload).await?;

        debug!("successfully sent webhook alert, status: {status}");
        Ok(())
    }
}
