//! Engine timing configuration.

use std::time::Duration;

/// Polling, retry and heartbeat settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Poll interval for the first `fast_ticks` polls
    pub fast_interval: Duration,
    /// Poll interval after the fast phase
    pub slow_interval: Duration,
    /// Number of polls before switching to `slow_interval`
    pub fast_ticks: u32,
    /// Hard cap on polls per activation
    pub tick_cap: u32,
    /// Consecutive failed polls before giving up
    pub error_cap: u32,
    /// Lost-session recovery is only attempted below this error count
    pub recovery_ceiling: u32,
    /// Heartbeat period while a job is active
    pub keepalive_period: Duration,
    /// Buffer size of each event channel
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fast_interval: Duration::from_secs(1),
            slow_interval: Duration::from_secs(2),
            fast_ticks: 60,
            tick_cap: 900,
            error_cap: 10,
            recovery_ceiling: 3,
            keepalive_period: Duration::from_secs(15),
            event_capacity: 64,
        }
    }
}

impl SessionConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            fast_interval: millis_from_env("CLIPFLOW_POLL_FAST_INTERVAL_MS")
                .unwrap_or(defaults.fast_interval),
            slow_interval: millis_from_env("CLIPFLOW_POLL_SLOW_INTERVAL_MS")
                .unwrap_or(defaults.slow_interval),
            fast_ticks: parse_env("CLIPFLOW_POLL_FAST_TICKS").unwrap_or(defaults.fast_ticks),
            tick_cap: parse_env("CLIPFLOW_POLL_TICK_CAP")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.tick_cap),
            error_cap: parse_env("CLIPFLOW_POLL_ERROR_CAP")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.error_cap),
            recovery_ceiling: parse_env("CLIPFLOW_POLL_RECOVERY_CEILING")
                .unwrap_or(defaults.recovery_ceiling),
            keepalive_period: parse_env::<u64>("CLIPFLOW_KEEPALIVE_PERIOD_SECS")
                .filter(|v| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.keepalive_period),
            event_capacity: defaults.event_capacity,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn millis_from_env(key: &str) -> Option<Duration> {
    parse_env::<u64>(key)
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.slow_interval, config.fast_interval * 2);
        assert_eq!(config.fast_ticks, 60);
        assert_eq!(config.tick_cap, 900);
        assert!(config.recovery_ceiling < config.error_cap);
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_invalid_values() {
        std::env::set_var("CLIPFLOW_POLL_TICK_CAP", "0");
        std::env::set_var("CLIPFLOW_POLL_FAST_TICKS", "abc");
        std::env::set_var("CLIPFLOW_POLL_FAST_INTERVAL_MS", "250");

        let config = SessionConfig::from_env();
        assert_eq!(config.tick_cap, 900);
        assert_eq!(config.fast_ticks, 60);
        assert_eq!(config.fast_interval, Duration::from_millis(250));

        std::env::remove_var("CLIPFLOW_POLL_TICK_CAP");
        std::env::remove_var("CLIPFLOW_POLL_FAST_TICKS");
        std::env::remove_var("CLIPFLOW_POLL_FAST_INTERVAL_MS");
    }
}
