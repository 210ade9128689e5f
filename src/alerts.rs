use chrono::FixedOffset;

use crate::Entity;
use crate::actors::messages::AlertRequest;
use crate::util::format_timestamp;

/// Renders alert requests as chat-friendly text
#[derive(Debug, Clone, Copy)]
pub struct AlertFormatter {
    /// Offset used for the date/time line
    offset: FixedOffset,
}

impl AlertFormatter {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn format(&self, alert: &AlertRequest) -> String {
        let (title, label) = match &alert.entity {
            Entity::Container { .. } => ("Container Alert", "Container"),
            Entity::Service { .. } => ("Service Alert", "Service"),
        };

        let mut message = format!(
            "🚨 *{title}*\n\n📦 *{label}:* {}\n📊 *Status:* {}\n⏰ *Date/Time:* {}",
            alert.entity.display_name(),
            alert.status,
            format_timestamp(alert.at, self.offset)
        );

        if let Some(error) = alert.error.as_deref().filter(|e| !e.is_empty()) {
            message.push_str(&format!("\n❌ *Error:* {error}"));
        }

        message
    }
}
