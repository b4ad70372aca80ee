//! Exponential backoff with optional jitter.

use std::time::Duration;
use rand::Rng;

/// Delay schedule between consecutive attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffSchedule {
    /// Multiplier applied after each failed attempt.
    pub factor: f64,
    /// Delay before the second attempt.
    pub min_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Option<Duration>,
    /// Add up to 10% jitter on top of the computed delay.
    pub randomize: bool,
}

impl BackoffSchedule {
    /// Delay to wait before `attempt` (1-based). The first attempt never waits.
    ///
    /// `delay(n) = min(min_delay * factor^(n-2), max_delay)` for `n >= 2`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        let base_ms = self.min_delay.as_millis() as f64;
        let mut delay_ms = base_ms * self.factor.powi(exponent);
        if let Some(max) = self.max_delay {
            delay_ms = delay_ms.min(max.as_millis() as f64);
        }
        // powi overflows to inf for long schedules without a cap.
        let delay_ms = if delay_ms.is_finite() { delay_ms as u64 } else { u64::MAX };

        let jitter_ms = if self.randomize {
            let jitter_range = delay_ms / 10;
            if jitter_range > 0 {
                rand::thread_rng().gen_range(0..jitter_range)
            } else {
                0
            }
        } else {
            0
        };

        Duration::from_millis(delay_ms.saturating_add(jitter_ms))
    }
}
