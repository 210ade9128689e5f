//! Stored record shapes and the dashboard aggregation
//!
//! ## Tables
//!
//! - `container_metrics`: one row per container id holding the latest
//!   sample and the container's alert counter
//! - `service_notifications`: alert counter per swarm service name
//!
//! Timestamps are stored as Unix milliseconds.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::util::base_name;
use crate::{HEALTHY_STATUS, MetricSample};

/// Status of a record created by an alert before the container was sampled
pub const PLACEHOLDER_STATUS: &str = "unknown";

pub fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

/// Collapse records sharing a base name into one row per group.
///
/// `service_counts` maps service names to their alert counters; a counter
/// is added to the group with the same base name.
pub fn aggregate_samples(
    rows: impl IntoIterator<Item = MetricSample>,
    service_counts: &HashMap<String, u64>,
) -> Vec<MetricSample> {
    let mut groups: BTreeMap<String, Vec<MetricSample>> = BTreeMap::new();
    for row in rows {
        groups
            .entry(base_name(&row.name).to_string())
            .or_default()
            .push(row);
    }

    groups
        .into_iter()
        .filter_map(|(base, group)| {
            let notifications: u64 = group.iter().map(|row| row.notifications_sent).sum::<u64>()
                + service_counts.get(&base).copied().unwrap_or_default();

            let mut representative = pick_representative(group)?;
            representative.name = base;
            representative.notifications_sent = notifications;
            Some(representative)
        })
        .collect()
}

/// Most recent running record, else most recent record
fn pick_representative(group: Vec<MetricSample>) -> Option<MetricSample> {
    let latest_running = group
        .iter()
        .enumerate()
        .filter(|(_, row)| row.status == HEALTHY_STATUS)
        .max_by_key(|(_, row)| row.last_update)
        .map(|(index, _)| index);

    let index = latest_running.or_else(|| {
        group
            .iter()
            .enumerate()
            .max_by_key(|(_, row)| row.last_update)
            .map(|(index, _)| index)
    })?;

    group.into_iter().nth(index)
}
