//! Derivation of per-second rates from cumulative runtime counters

use chrono::{DateTime, Utc};

use crate::runtime::ResourceSnapshot;

/// Cumulative counters of one container at one point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateBasis {
    pub observed_at: DateTime<Utc>,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Per-second rates between two readings
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rates {
    pub network_rx: f64,
    pub network_tx: f64,
    pub disk_read: f64,
    pub disk_write: f64,
}

impl RateBasis {
    /// Extract the counters of a snapshot.
    ///
    /// Network counters are summed over every interface, block I/O over
    /// every device. `now` is used when the snapshot carries no usable
    /// read time.
    pub fn from_snapshot(snapshot: &ResourceSnapshot, now: DateTime<Utc>) -> Self {
        let (rx_bytes, tx_bytes) = snapshot
            .networks
            .iter()
            .flat_map(|networks| networks.values())
            .fold((0u64, 0u64), |(rx, tx), net| {
                (rx.saturating_add(net.rx_bytes), tx.saturating_add(net.tx_bytes))
            });

        let (read_bytes, write_bytes) = snapshot
            .blkio_stats
            .io_service_bytes_recursive
            .iter()
            .flatten()
            .fold((0u64, 0u64), |(read, write), entry| {
                if entry.op.eq_ignore_ascii_case("read") {
                    (read.saturating_add(entry.value), write)
                } else if entry.op.eq_ignore_ascii_case("write") {
                    (read, write.saturating_add(entry.value))
                } else {
                    (read, write)
                }
            });

        // the engine reports 0001-01-01 before the first reading
        let observed_at = snapshot
            .read
            .filter(|read| read.timestamp() > 0)
            .unwrap_or(now);

        Self {
            observed_at,
            rx_bytes,
            tx_bytes,
            read_bytes,
            write_bytes,
        }
    }

    /// Rates from `previous` to `self`, all zero without a previous reading
    pub fn rates_since(&self, previous: Option<&RateBasis>) -> Rates {
        let Some(previous) = previous else {
            return Rates::default();
        };

        let elapsed = self
            .observed_at
            .signed_duration_since(previous.observed_at)
            .num_milliseconds() as f64
            / 1000.0;

        Rates {
            network_rx: rate(self.rx_bytes, previous.rx_bytes, elapsed),
            network_tx: rate(self.tx_bytes, previous.tx_bytes, elapsed),
            disk_read: rate(self.read_bytes, previous.read_bytes, elapsed),
            disk_write: rate(self.write_bytes, previous.write_bytes, elapsed),
        }
    }
}

/// `(current - previous) / elapsed`, never negative
pub fn rate(current: u64, previous: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 || current < previous {
        return 0.0;
    }
    (current - previous) as f64 / elapsed_secs
}

/// Share of host CPU time used between the snapshot's two CPU readings
pub fn cpu_fraction(snapshot: &ResourceSnapshot) -> f64 {
    let cpu_delta = snapshot
        .cpu_stats
        .cpu_usage
        .total_usage
        .saturating_sub(snapshot.precpu_stats.cpu_usage.total_usage);

    let system_delta = snapshot
        .cpu_stats
        .system_cpu_usage
        .unwrap_or_default()
        .saturating_sub(snapshot.precpu_stats.system_cpu_usage.unwrap_or_default());

    if system_delta == 0 {
        return 0.0;
    }
    cpu_delta as f64 / system_delta as f64
}
