//! Timing and retry configuration for channels and the request queue.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Channel timers (heartbeat, closed-check, backoff, ack deadline)
    pub channel: ChannelTimings,
    /// Timeout and retry policy for queued HTTP requests
    pub http: HttpPolicy,
    /// Period of the run's liveness request; 0 disables it
    pub heartbeat_period_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel: ChannelTimings::default(),
            http: HttpPolicy::default(),
            heartbeat_period_ms: 120_000,
        }
    }
}

impl SyncConfig {
    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_period_ms)
    }
}

/// Timers used by a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelTimings {
    /// How long to wait for SESSION_ACK / FIXED after sending
    pub sending_timeout_ms: u64,
    /// Time between heartbeat pings
    pub heartbeat_interval_ms: u64,
    /// How long a heartbeat ping may stay unanswered
    pub heartbeat_timeout_ms: u64,
    /// Time between polls of the transport's ready state
    pub closed_check_interval_ms: u64,
    /// First reconnect delay
    pub backoff_min_ms: u64,
    /// Reconnect delay cap
    pub backoff_max_ms: u64,
}

impl Default for ChannelTimings {
    fn default() -> Self {
        Self {
            sending_timeout_ms: 10_000,
            heartbeat_interval_ms: 25_000,
            heartbeat_timeout_ms: 10_000,
            closed_check_interval_ms: 2_000,
            backoff_min_ms: 1_000,
            backoff_max_ms: 120_000,
        }
    }
}

impl ChannelTimings {
    pub fn sending_timeout(&self) -> Duration {
        Duration::from_millis(self.sending_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn closed_check_interval(&self) -> Duration {
        Duration::from_millis(self.closed_check_interval_ms)
    }

    pub fn backoff_min(&self) -> Duration {
        Duration::from_millis(self.backoff_min_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

/// Per-request timeout and retry budget for the request queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpPolicy {
    /// Timeout of a single attempt
    pub timeout_ms: u64,
    /// Number of retries after the first attempt
    pub retries: u32,
    /// Wait between two attempts
    pub retry_wait_ms: u64,
}

impl Default for HttpPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            retries: 5,
            retry_wait_ms: 1_000,
        }
    }
}

impl HttpPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }
}
