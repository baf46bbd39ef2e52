//! Async progress-callback type threaded through job execution.
//!
//! Both the mock backend and the ComfyUI submit/poll protocol report
//! progress through the same callback: the dispatcher builds one per job
//! that updates the stored record and publishes to the progress bus.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by a progress callback invocation.
pub type ProgressFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Shared async callback: `(percent, message)`.
///
/// Invocations are awaited by the caller, so a callback sees updates in
/// the order they were reported.
pub type ProgressCallback = Arc<dyn Fn(u8, String) -> ProgressFuture + Send + Sync>;

/// Build a progress callback from an async closure.
pub fn progress_fn<F, Fut>(f: F) -> ProgressCallback
where
    F: Fn(u8, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |pct, msg| -> ProgressFuture { Box::pin(f(pct, msg)) })
}

/// A callback that discards all updates. Useful in tests.
pub fn noop_progress() -> ProgressCallback {
    progress_fn(|_, _| async {})
}
