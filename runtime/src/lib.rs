//! Process-level wiring for the component bus: settings, logging and the
//! services a `blockrun` process can host.

use std::time::Duration;

pub mod logger;
pub mod services;

/// Default bound on every naming service round trip.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
/// Default scheduler tick.
pub const DEFAULT_INTERVAL_MS: u64 = 100;

/// Milliseconds from the CLI, then from env `var`, then `default`.
/// Unparseable env values are ignored.
pub fn millis(cli: Option<u64>, var: &str, default: u64) -> Duration {
    let ms = cli
        .or_else(|| std::env::var(var).ok()?.parse::<u64>().ok())
        .unwrap_or(default);
    Duration::from_millis(ms)
}

/// Request timeout from CLI or `BLOCK_TIMEOUT_MS`.
pub fn request_timeout(cli: Option<u64>) -> Duration {
    millis(cli, "BLOCK_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)
}

/// Scheduler interval from CLI or `BLOCK_INTERVAL_MS`.
pub fn heartbeat_interval(cli: Option<u64>) -> Duration {
    millis(cli, "BLOCK_INTERVAL_MS", DEFAULT_INTERVAL_MS)
}
