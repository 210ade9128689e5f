use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::Gateway;

use super::{DeliveryError, Notifier, gateway_incomplete, post_json};

/// Wuzapi and Meow share one wire format and differ only in naming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayFlavor {
    Wuzapi,
    Meow,
}

#[derive(Debug, Serialize)]
struct Payload<'a> {
    #[serde(rename = "Phone")]
    phone: &'a str,
    #[serde(rename = "Body")]
    body: &'a str,
}

/// WhatsApp delivery through a Wuzapi or Meow gateway
#[derive(Debug, Clone)]
pub struct WuzapiNotifier {
    client: Client,
    gateway: Gateway,
    flavor: GatewayFlavor,
}

impl WuzapiNotifier {
    pub fn new(client: Client, gateway: Gateway, flavor: GatewayFlavor) -> Self {
        Self {
            client,
            gateway,
            flavor,
        }
    }
}

#[async_trait]
impl Notifier for WuzapiNotifier {
    fn name(&self) -> &'static str {
        match self.flavor {
            GatewayFlavor::Wuzapi => "wuzapi",
            GatewayFlavor::Meow => "meow",
        }
    }

    #[instrument(skip_all, fields(gateway = self.name()))]
    async fn send_alert(&self, message: &str) -> Result<(), DeliveryError> {
        if gateway_incomplete(&self.gateway) {
            return Err(DeliveryError::NotConfigured(self.name().to_string()));
        }

        let request = self
            .client
            .post(&self.gateway.api)
            .header("token", &self.gateway.key);

        let status = post_json(
            request,
            &Payload {
                phone: &self.gateway.number,
                body: message,
            },
        )
        .await?;

        debug!("notification sent via {}, status: {status}", self.name());
        Ok(())
    }
}
