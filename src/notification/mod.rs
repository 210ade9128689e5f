//! Notification sinks
//!
//! Alerts leave the process through a [`Notifier`]. One implementation is
//! chosen at startup from the configuration; the rest of the crate only
//! sees `Arc<dyn Notifier>`.

pub mod discord;
pub mod evolution;
pub mod webhook;
pub mod wuzapi;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{Gateway, NotificationConfig};

pub use discord::DiscordNotifier;
pub use evolution::EvolutionNotifier;
pub use webhook::WebhookNotifier;
pub use wuzapi::{GatewayFlavor, WuzapiNotifier};

/// Timeout of one delivery attempt
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum DeliveryError {
    /// The sink lacks credentials or an endpoint
    NotConfigured(String),

    /// The sink answered with a non-success status
    Rejected { status: u16, body: String },

    /// The sink could not be reached
    Transport(String),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::NotConfigured(sink) => write!(f, "{sink} notification not configured"),
            DeliveryError::Rejected { status, body } => {
                write!(f, "notification rejected with status {status}: {body}")
            }
            DeliveryError::Transport(msg) => write!(f, "failed to deliver notification: {msg}"),
        }
    }
}

impl std::error::Error for DeliveryError {}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Transport(err.to_string())
    }
}

/// A destination for formatted alert texts
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    async fn send_alert(&self, message: &str) -> Result<(), DeliveryError>;
}

/// Sink used when no notification service is configured
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send_alert(&self, message: &str) -> Result<(), DeliveryError> {
        info!("alert (no notification service configured):\n{message}");
        Ok(())
    }
}

/// Build the configured sink, falling back to [`LogNotifier`]
pub fn build_notifier(config: Option<&NotificationConfig>) -> Arc<dyn Notifier> {
    let client = reqwest::Client::new();

    let Some(config) = config else {
        warn!("no notification service configured, alerts will only be logged");
        return Arc::new(LogNotifier);
    };

    if let NotificationConfig::Evolution(gateway)
    | NotificationConfig::Wuzapi(gateway)
    | NotificationConfig::Meow(gateway) = config
        && gateway_incomplete(gateway)
    {
        warn!("notification gateway is missing api, key or number; deliveries will fail");
    }

    match config {
        NotificationConfig::Evolution(gateway) => {
            Arc::new(EvolutionNotifier::new(client, gateway.clone()))
        }
        NotificationConfig::Wuzapi(gateway) => Arc::new(WuzapiNotifier::new(
            client,
            gateway.clone(),
            GatewayFlavor::Wuzapi,
        )),
        NotificationConfig::Meow(gateway) => Arc::new(WuzapiNotifier::new(
            client,
            gateway.clone(),
            GatewayFlavor::Meow,
        )),
        NotificationConfig::Discord(discord) => {
            Arc::new(DiscordNotifier::new(client, discord.clone()))
        }
        NotificationConfig::Webhook(webhook) => {
            Arc::new(WebhookNotifier::new(client, webhook.clone()))
        }
    }
}

fn gateway_incomplete(gateway: &Gateway) -> bool {
    gateway.api.is_empty() || gateway.key.is_empty() || gateway.number.is_empty()
}

/// POST a JSON body, mapping non-success statuses to [`DeliveryError::Rejected`]
async fn post_json(
    request: reqwest::RequestBuilder,
    body: &impl Serialize,
) -> Result<reqwest::StatusCode, DeliveryError> {
    let response = request
        .header("Accept", "application/json")
        .json(body)
        .timeout(DELIVERY_TIMEOUT)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    Ok(status)
}
