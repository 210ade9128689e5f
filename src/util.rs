use chrono::{DateTime, FixedOffset, Utc};

/// Strip the leading slash the runtime puts in front of container names.
pub fn normalize_name(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

/// Name up to the first `.`.
///
/// Swarm task containers are named `<service>.<slot>.<task id>`, so this
/// collapses every replica of a service onto the service name.
pub fn base_name(name: &str) -> &str {
    let name = normalize_name(name);
    name.split('.').next().unwrap_or(name)
}

/// Render a timestamp as `dd/mm/yyyy HH:MM:SS` in the given offset.
pub fn format_timestamp(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset)
        .format("%d/%m/%Y %H:%M:%S")
        .to_string()
}
