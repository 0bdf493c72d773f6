//! Runtime shims so the same code drives tokio natively and the browser
//! event loop on wasm32.

use futures::future::{AbortHandle, abortable};
use std::future::Future;
use std::time::Duration;

/// `Send` on native targets, no bound on wasm32 where everything runs on
/// the single browser thread.
#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSend: Send {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send> MaybeSend for T {}

#[cfg(target_arch = "wasm32")]
pub trait MaybeSend {}
#[cfg(target_arch = "wasm32")]
impl<T> MaybeSend for T {}

/// Deadline exceeded while awaiting a future
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {}ms elapsed", .0.as_millis())]
pub struct Elapsed(pub Duration);

/// Spawn a detached background future
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn<F>(future: F)
where
    F: Future<Output = ()> + MaybeSend + 'static,
{
    tokio::spawn(future);
}

/// Spawn a detached background future
#[cfg(target_arch = "wasm32")]
pub fn spawn<F>(future: F)
where
    F: Future<Output = ()> + MaybeSend + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Suspend the current task for `duration`
#[cfg(not(target_arch = "wasm32"))]
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Suspend the current task for `duration`
#[cfg(target_arch = "wasm32")]
pub async fn sleep(duration: Duration) {
    gloo_timers::future::sleep(duration).await;
}

/// Await `future`, giving up once `limit` has elapsed.
///
/// The losing future is dropped, which cancels any in-flight work it owns.
#[cfg(not(target_arch = "wasm32"))]
pub async fn deadline<F: Future>(limit: Duration, future: F) -> Result<F::Output, Elapsed> {
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| Elapsed(limit))
}

/// Await `future`, giving up once `limit` has elapsed.
#[cfg(target_arch = "wasm32")]
pub async fn deadline<F: Future>(limit: Duration, future: F) -> Result<F::Output, Elapsed> {
    use futures::future::{Either, select};
    use std::pin::pin;

    match select(pin!(future), pin!(sleep(limit))).await {
        Either::Left((output, _)) => Ok(output),
        Either::Right(((), _)) => Err(Elapsed(limit)),
    }
}

/// Owned handle to a background loop. Dropping the handle stops the loop.
#[derive(Debug)]
pub struct TaskHandle {
    abort: AbortHandle,
}

impl TaskHandle {
    /// Stop the task. Idempotent.
    pub fn abort(&self) {
        self.abort.abort();
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

/// Spawn `future` and return a handle that cancels it
pub fn spawn_abortable<F>(future: F) -> TaskHandle
where
    F: Future<Output = ()> + MaybeSend + 'static,
{
    let (future, abort) = abortable(future);
    spawn(async move {
        let _ = future.await;
    });
    TaskHandle { abort }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn deadline_reports_elapsed() {
        let result = deadline(Duration::from_millis(50), sleep(Duration::from_secs(5))).await;
        assert_eq!(result, Err(Elapsed(Duration::from_millis(50))));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_passes_output_through() {
        let result = deadline(Duration::from_secs(1), async { 7 }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_stops_loop() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let handle = spawn_abortable(async move {
            loop {
                sleep(Duration::from_secs(1)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        sleep(Duration::from_millis(3500)).await;
        drop(handle);
        let seen = ticks.load(Ordering::SeqCst);
        sleep(Duration::from_secs(5)).await;

        assert_eq!(seen, 3);
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }
}
