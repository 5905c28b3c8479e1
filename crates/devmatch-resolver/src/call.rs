//! Guard for calls into collaborator code.
//!
//! Drivers, locators, selectors, devices and the module loader are foreign
//! code running on the worker task. A call that hangs past the configured
//! timeout, or panics, is turned into a [`KernelError`] so the worker keeps
//! going with the next candidate.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use devmatch_kernel::{KernelError, KernelResult};
use futures::FutureExt;

/// Run `call`, bounded by `timeout` when one is set.
pub async fn guarded<T, F>(operation: &str, timeout: Option<Duration>, call: F) -> KernelResult<T>
where
    F: Future<Output = KernelResult<T>>,
{
    let call = AssertUnwindSafe(call).catch_unwind();
    let outcome = match timeout {
        Some(after) => match tokio::time::timeout(after, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(KernelError::Timeout {
                    operation: operation.to_string(),
                    after,
                });
            }
        },
        None => call.await,
    };

    outcome.unwrap_or_else(|panic| {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(KernelError::Internal(format!("{operation} panicked: {message}")))
    })
}

/// [`guarded`] for calls that cannot fail on their own.
pub async fn guarded_infallible<T, F>(
    operation: &str,
    timeout: Option<Duration>,
    call: F,
) -> KernelResult<T>
where
    F: Future<Output = T>,
{
    guarded(operation, timeout, call.map(Ok)).await
}
