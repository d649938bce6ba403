use std::time::Duration;

/// Exponential backoff applied between consecutive transport failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub factor: f32,
    /// Consecutive failures tolerated; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(5),
            factor: 2.0,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Retries immediately, at most `attempts` times in a row.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            initial: Duration::ZERO,
            max: Duration::ZERO,
            factor: 1.0,
            max_attempts: Some(attempts),
        }
    }

    /// Delay before retry number `attempt` (1-based), `None` once exhausted.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if let Some(max_attempts) = self.max_attempts {
            if attempt > max_attempts {
                return None;
            }
        }

        let exp = attempt.saturating_sub(1).min(64) as i32;
        let secs = self.initial.as_secs_f32() * self.factor.max(1.0).powi(exp);

        Some(
            Duration::try_from_secs_f32(secs)
                .unwrap_or(self.max)
                .min(self.max),
        )
    }
}
