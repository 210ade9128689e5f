use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::EntityKey;

/// Last observed status of one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    pub key: EntityKey,
    pub status: String,
    pub observed_at: DateTime<Utc>,
}

/// In-memory map of entity key to last known status.
///
/// Records are only removed explicitly, by key.
#[derive(Debug, Default)]
pub struct StateTracker {
    records: HashMap<EntityKey, StateRecord>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &EntityKey) -> Option<&StateRecord> {
        self.records.get(key)
    }

    /// Store `status` for `key`, returning the previous record
    pub fn set(
        &mut self,
        key: EntityKey,
        status: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Option<StateRecord> {
        let record = StateRecord {
            key: key.clone(),
            status: status.into(),
            observed_at: at,
        };
        self.records.insert(key, record)
    }

    pub fn remove(&mut self, key: &EntityKey) -> Option<StateRecord> {
        self.records.remove(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}
