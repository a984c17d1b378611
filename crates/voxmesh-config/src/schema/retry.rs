use serde::{Deserialize, Serialize};

/// Join retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries allowed for generic failures before the session errors out.
    pub max_retries: u32,
    /// Linear backoff step: retry `n` waits `base_delay_ms * n`.
    pub base_delay_ms: u64,
    /// Fixed delay of the single retry after "session not found".
    pub session_not_found_delay_ms: u64,
    /// Seconds spent disconnected in a room before one forced retry.
    pub watchdog_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            session_not_found_delay_ms: 300,
            watchdog_secs: 5,
        }
    }
}
