use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::Gateway;

use super::{DeliveryError, Notifier, gateway_incomplete, post_json};

/// Body of an Evolution API text message
#[derive(Debug, Serialize)]
struct Payload<'a> {
    number: &'a str,
    text: &'a str,
}

/// WhatsApp delivery through an Evolution API instance
#[derive(Debug, Clone)]
pub struct EvolutionNotifier {
    client: Client,
    gateway: Gateway,
}

impl EvolutionNotifier {
    pub fn new(client: Client, gateway: Gateway) -> Self {
        Self { client, gateway }
    }
}

#[async_trait]
impl Notifier for EvolutionNotifier {
    fn name(&self) -> &'static str {
        "evolution"
    }

    #[instrument(skip_all)]
    async fn send_alert(&self, message: &str) -> Result<(), DeliveryError> {
        if gateway_incomplete(&self.gateway) {
            return Err(DeliveryError::NotConfigured(self.name().to_string()));
        }

        let request = self
            .client
            .post(&self.gateway.api)
            .header("apikey", &self.gateway.key);

        let status = post_json(
            request,
            &Payload {
                number: &self.gateway.number,
                text: message,
            },
        )
        .await?;

        debug!("notification sent via evolution, status: {status}");
        Ok(())
    }
}
