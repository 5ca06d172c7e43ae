//! Delay between timer ticks.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capped exponential backoff applied after consecutive fetch failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Upper bound for the delay between ticks.
    pub max_interval: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_interval: Duration::from_secs(120),
        }
    }
}

/// Delay before the next tick given the number of consecutive failures.
pub fn next_delay(interval: Duration, backoff: Option<&BackoffConfig>, failures: u32) -> Duration {
    match backoff {
        Some(cfg) if failures > 0 => {
            let factor = 1u32 << failures.min(16);
            interval.saturating_mul(factor).min(cfg.max_interval.max(interval))
        }
        _ => interval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_no_backoff_keeps_interval() {
        assert_eq!(next_delay(SECOND, None, 5), SECOND);
    }

    #[test]
    fn test_doubles_per_failure() {
        let cfg = BackoffConfig {
            max_interval: Duration::from_secs(60),
        };
        assert_eq!(next_delay(SECOND, Some(&cfg), 0), SECOND);
        assert_eq!(next_delay(SECOND, Some(&cfg), 1), 2 * SECOND);
        assert_eq!(next_delay(SECOND, Some(&cfg), 3), 8 * SECOND);
    }

    #[test]
    fn test_capped() {
        let cfg = BackoffConfig {
            max_interval: Duration::from_secs(10),
        };
        assert_eq!(next_delay(SECOND, Some(&cfg), 30), Duration::from_secs(10));
    }
}
