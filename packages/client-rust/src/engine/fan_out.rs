//! Bounded-concurrency execution of one asynchronous action over many inputs.

use std::future::Future;
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use regsync_core::{IndexedFailure, RegistryError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Runs `action` over `items` with at most `max_concurrency` invocations
/// active at once. A freed slot is refilled with the next input right away.
///
/// On the first failure no further inputs are started; the invocations
/// already running are drained and every failure observed by then is
/// returned in one [`RegistryError::FanOut`], ordered by input position.
/// Results are not collected: actions publish them as side effects.
///
/// `max_concurrency` below 1 is treated as 1.
///
/// # Errors
///
/// - [`RegistryError::Cancelled`] as soon as `cancel` fires; in-flight
///   invocations are dropped.
/// - [`RegistryError::FanOut`] if any invocation failed.
pub async fn bounded_for_each<I, T, F, Fut>(
    items: I,
    max_concurrency: usize,
    mut action: F,
    cancel: &CancellationToken,
) -> Result<(), RegistryError>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<(), RegistryError>>,
{
    let limit = max_concurrency.max(1);
    let items: Vec<T> = items.into_iter().collect();
    let total = items.len();
    let mut pending = items.into_iter().enumerate();

    let mut active = FuturesUnordered::new();
    let mut failures: Vec<IndexedFailure> = Vec::new();
    let mut completed = 0usize;

    loop {
        while failures.is_empty() && active.len() < limit {
            let Some((index, item)) = pending.next() else {
                break;
            };
            let invocation = action(item);
            active.push(async move { (index, invocation.await) });
        }

        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RegistryError::Cancelled),
            next = active.next() => next,
        };
        let Some((index, result)) = next else {
            break;
        };

        completed += 1;
        if let Err(error) = result {
            if failures.is_empty() {
                warn!(
                    index,
                    active = active.len(),
                    error = %error,
                    "item failed, draining active invocations"
                );
            }
            failures.push(IndexedFailure {
                index,
                error: Arc::new(error),
            });
        }
    }

    if failures.is_empty() {
        return Ok(());
    }
    failures.sort_by_key(|f| f.index);
    Err(RegistryError::FanOut {
        completed,
        total,
        failures,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
