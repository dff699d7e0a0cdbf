//! Operation engine: the submit/poll runner, the cursor pager and the bounded
//! fan-out.
//!
//! Every suspension point in here races the caller's [`CancellationToken`];
//! a cancellation always surfaces as [`RegistryError::Cancelled`].

pub mod fan_out;
pub mod pager;
pub mod runner;

use std::future::Future;
use std::time::Duration;

use regsync_core::RegistryError;
use tokio_util::sync::CancellationToken;

pub use fan_out::bounded_for_each;
pub use pager::{for_each_page, PageScan};
pub use runner::{AsyncOperationRunner, OperationOptions};

/// Sleeps for `delay` unless `cancel` fires first.
pub(crate) async fn sleep_or_cancel(
    delay: Duration,
    cancel: &CancellationToken,
) -> Result<(), RegistryError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(RegistryError::Cancelled),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Drives `call` to completion unless `cancel` fires first, in which case the
/// call is dropped.
pub(crate) async fn call_or_cancel<T, F>(
    call: F,
    cancel: &CancellationToken,
) -> Result<T, RegistryError>
where
    F: Future<Output = Result<T, RegistryError>>,
{
    if cancel.is_cancelled() {
        return Err(RegistryError::Cancelled);
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(RegistryError::Cancelled),
        result = call => result,
    }
}
