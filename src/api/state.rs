//! API shared state containing actor handles

use std::sync::Arc;

use crate::actors::{alert::AlertHandle, broadcaster::BroadcastHandle};
use crate::storage::StorageBackend;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Storage backend for the aggregated metrics view
    pub storage: Arc<dyn StorageBackend>,

    /// Coalescer handing out dashboard subscriptions
    pub broadcaster: BroadcastHandle,

    /// Alert actor, for delivery statistics
    pub alerts: AlertHandle,
}

impl ApiState {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        broadcaster: BroadcastHandle,
        alerts: AlertHandle,
    ) -> Self {
        Self {
            storage,
            broadcaster,
            alerts,
        }
    }
}
