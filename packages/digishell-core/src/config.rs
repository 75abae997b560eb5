use crate::{DEFAULT_FLDIGI_HOST, DEFAULT_FLDIGI_PORT};
use std::time::Duration;

/// Where fldigi listens and how long a single call may take
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub host: String,
    pub port: u16,

    /// Upper bound on one XML-RPC round trip, connect included
    pub call_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_FLDIGI_HOST.to_string(),
            port: DEFAULT_FLDIGI_PORT,
            call_timeout: Duration::from_secs(3),
        }
    }
}

impl LinkConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or unparsable keys fall back
    /// to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("FLDIGI_HOST")
                .filter(|h| !h.trim().is_empty())
                .unwrap_or(defaults.host),
            port: lookup("FLDIGI_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            call_timeout: lookup("FLDIGI_TIMEOUT_MS")
                .and_then(|t| t.parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.call_timeout),
        }
    }

    /// XML-RPC endpoint URL
    pub fn url(&self) -> String {
        format!("http://{}:{}/RPC2", self.host, self.port)
    }
}

/// Cadence and thresholds for the link supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Sleep between healthy ticks
    pub poll_interval: Duration,

    /// Run a health check every N ticks
    pub health_check_every: u32,

    /// Build and publish a status snapshot every N ticks
    pub status_poll_every: u32,

    /// Consecutive connectivity failures before the link is forced down
    pub failure_threshold: u32,

    /// Sleep after a failed tick
    pub backoff_interval: Duration,

    /// How often to retry connecting while the link is down.
    /// Zero disables automatic reconnection.
    pub reconnect_interval: Duration,

    /// Log every Nth consecutive failure (the first is always logged)
    pub failure_log_every: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            health_check_every: 50,
            status_poll_every: 5,
            failure_threshold: 5,
            backoff_interval: Duration::from_secs(1),
            reconnect_interval: Duration::from_secs(5),
            failure_log_every: 20,
        }
    }
}

impl SupervisorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let positive = |key: &str| {
            lookup(key)
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|n| *n > 0)
        };
        let millis = |key: &str| lookup(key).and_then(|v| v.parse::<u64>().ok());

        Self {
            poll_interval: millis("DIGISHELL_POLL_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            health_check_every: positive("DIGISHELL_HEALTH_CHECK_TICKS")
                .unwrap_or(defaults.health_check_every),
            status_poll_every: positive("DIGISHELL_STATUS_POLL_TICKS")
                .unwrap_or(defaults.status_poll_every),
            failure_threshold: positive("DIGISHELL_FAILURE_THRESHOLD")
                .unwrap_or(defaults.failure_threshold),
            backoff_interval: millis("DIGISHELL_BACKOFF_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_interval),
            // 0 is meaningful here: it turns reconnection off
            reconnect_interval: millis("DIGISHELL_RECONNECT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect_interval),
            failure_log_every: defaults.failure_log_every,
        }
    }

    /// Number of ticks between reconnect attempts, `None` when disabled
    pub fn reconnect_every_ticks(&self) -> Option<u32> {
        if self.reconnect_interval.is_zero() {
            return None;
        }
        let poll = self.poll_interval.as_millis().max(1);
        let ticks = self.reconnect_interval.as_millis().div_ceil(poll);
        Some(u32::try_from(ticks).unwrap_or(u32::MAX).max(1))
    }
}
