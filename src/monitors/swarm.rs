use chrono::{DateTime, Duration, Utc};

use crate::runtime::Task;

/// Task states that count as a service failure
pub const FAILURE_STATES: &[&str] = &["failed", "rejected", "shutdown", "orphaned", "remove"];

pub fn is_failure_state(state: &str) -> bool {
    FAILURE_STATES
        .iter()
        .any(|failure| failure.eq_ignore_ascii_case(state))
}

/// Most recent failed task whose failure happened within `freshness` of `now`.
///
/// Tasks without a timestamp never qualify. On equal timestamps the task
/// listed last wins.
pub fn latest_fresh_failure<'a>(
    tasks: &'a [Task],
    now: DateTime<Utc>,
    freshness: Duration,
) -> Option<&'a Task> {
    tasks
        .iter()
        .filter(|task| is_failure_state(&task.status.state))
        .filter_map(|task| task.status.timestamp.map(|at| (task, at)))
        .filter(|(_, at)| now.signed_duration_since(*at) < freshness)
        .fold(None, |latest: Option<(&Task, DateTime<Utc>)>, (task, at)| match latest {
            Some((_, latest_at)) if latest_at > at => latest,
            _ => Some((task, at)),
        })
        .map(|(task, _)| task)
}
