//! Wall-clock abstraction used for token expiry arithmetic

use std::fmt;

/// Source of the current time, in whole seconds since the Unix epoch.
///
/// Expiry instants (`exp`) are issued by the server in the same unit, so all
/// countdown arithmetic happens in seconds.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> i64;
}

/// Clock backed by the system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_close_to_chrono() {
        let clock = SystemClock;
        let diff = (clock.now() - chrono::Utc::now().timestamp()).abs();
        assert!(diff <= 1);
    }
}
