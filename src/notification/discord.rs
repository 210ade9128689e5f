use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::Discord;

use super::{DeliveryError, Notifier, post_json};

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub content: String,
}

/// Delivery to a Discord channel webhook
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: Client,
    discord: Discord,
}

impl DiscordNotifier {
    pub fn new(client: Client, discord: Discord) -> Self {
        Self { client, discord }
    }

    /// Message body, mentioning the configured user if any
    pub fn build_message(&self, text: &str) -> Message {
        let content = match &self.discord.user_id {
            Some(user_id) => format!("{text}\n<@{user_id}>"),
            None => text.to_string(),
        };
        Message { content }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &'static str {
        "discord"
    }

    #[instrument(skip_all)]
    async fn send_alert(&self, message: &str) -> Result<(), DeliveryError> {
        if self.discord.url.is_empty() {
            return Err(DeliveryError::NotConfigured(self.name().to_string()));
        }

        let status = post_json(
            self.client.post(&self.discord.url),
            &self.build_message(message),
        )
        .await?;

        debug!("successfully sent Discord message, status: {status}");
        Ok(())
    }
}
