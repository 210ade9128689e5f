use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::EntityKey;

/// Default minimum spacing between two alerts for one entity
pub const DEFAULT_COOLDOWN_SECS: i64 = 10;

/// Per-entity alert gate.
///
/// [`Debouncer::should_alert`] decides and records in one call, so two
/// callers can never both pass for the same window.
#[derive(Debug)]
pub struct Debouncer {
    cooldown: Duration,
    last_alert: HashMap<EntityKey, DateTime<Utc>>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_COOLDOWN_SECS))
    }
}

impl Debouncer {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_alert: HashMap::new(),
        }
    }

    pub fn should_alert(&mut self, key: &EntityKey, now: DateTime<Utc>) -> bool {
        if let Some(last) = self.last_alert.get(key)
            && now.signed_duration_since(*last) < self.cooldown
        {
            return false;
        }

        self.last_alert.insert(key.clone(), now);
        true
    }

    pub fn last_alert_at(&self, key: &EntityKey) -> Option<DateTime<Utc>> {
        self.last_alert.get(key).copied()
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
