use std::sync::Weak;
use std::time::Duration;

use tether_core::rt::{self, TaskHandle};
use tether_core::{CountdownTick, SessionEvent};

use super::Inner;

/// Armed countdown against one access-token expiry.
///
/// Dropping it stops the timer. A countdown armed right after a refresh
/// whose expiry already lies inside the threshold skips the threshold and
/// waits for expiry, so a short-lived token costs one refresh per lifetime.
#[derive(Debug)]
pub(crate) struct Countdown {
    exp: i64,
    _task: TaskHandle,
}

impl Countdown {
    pub(crate) fn start(
        lifecycle: Weak<Inner>,
        exp: i64,
        tick: Duration,
        refreshed: bool,
    ) -> Option<Self> {
        let (total, threshold) = {
            let inner = lifecycle.upgrade()?;
            (exp - inner.clock.now(), inner.config.expiring_threshold_secs)
        };
        let skip_threshold = refreshed && total <= threshold;
        tracing::debug!(exp, total, skip_threshold, "arming countdown");

        let task = rt::spawn_abortable(async move {
            let mut threshold_crossed = skip_threshold;
            loop {
                let Some(inner) = lifecycle.upgrade() else {
                    break;
                };

                let remaining = exp - inner.clock.now();
                inner
                    .events
                    .publish(SessionEvent::Countdown(CountdownTick::new(remaining, total)));

                if remaining <= 0 {
                    inner.on_expired(exp);
                    break;
                }
                if remaining <= inner.config.expiring_threshold_secs && !threshold_crossed {
                    threshold_crossed = true;
                    inner.on_threshold(remaining);
                }

                drop(inner);
                rt::sleep(tick).await;
            }
        });

        Some(Self { exp, _task: task })
    }

    pub(crate) const fn exp(&self) -> i64 {
        self.exp
    }
}
