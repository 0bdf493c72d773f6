use std::time::Duration;

/// Bounded retry with exponential backoff.
///
/// Every failure kind, timeouts included, draws from the same budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(retries: u32, base_delay: Duration) -> Self {
        Self {
            retries,
            base_delay,
        }
    }

    /// No retries at all
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `retry` (0-based), or `None` once the
    /// budget is spent
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Option<Duration> {
        if retry >= self.retries {
            return None;
        }
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor))
    }

    /// Retries left after `retry` of them have been used
    #[must_use]
    pub const fn remaining(&self, retry: u32) -> u32 {
        self.retries.saturating_sub(retry)
    }
}
