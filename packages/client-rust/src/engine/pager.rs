//! Cursor-driven iteration over paginated fetches.

use std::future::Future;

use regsync_core::{Cursor, Page, PageMarker, RegistryError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::call_or_cancel;

/// Outcome of a page scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageScan {
    /// The scan delivered this many items (at least one).
    Found(usize),
    /// The query matched nothing.
    NothingFound,
}

impl PageScan {
    fn from_count(count: usize) -> Self {
        if count == 0 {
            Self::NothingFound
        } else {
            Self::Found(count)
        }
    }

    /// Number of delivered items; zero for [`PageScan::NothingFound`].
    #[must_use]
    pub fn count(self) -> usize {
        match self {
            Self::Found(n) => n,
            Self::NothingFound => 0,
        }
    }
}

/// Fetches pages starting from no cursor and hands every item to `on_item`
/// in page order, until a page marks itself as the last one.
///
/// Empty pages are tolerated. A scan that delivers nothing, including one
/// whose first page reports "no objects", yields [`PageScan::NothingFound`].
/// A "no objects" answer on a later page ends the scan. The pager never
/// deduplicates items.
///
/// # Errors
///
/// - [`RegistryError::Cancelled`] if `cancel` fires.
/// - [`RegistryError::Protocol`] if a page points back at the cursor it was
///   fetched with.
/// - Any other error from `fetch`.
pub async fn for_each_page<T, F, Fut, H>(
    mut fetch: F,
    mut on_item: H,
    cancel: &CancellationToken,
) -> Result<PageScan, RegistryError>
where
    F: FnMut(Option<Cursor>) -> Fut,
    Fut: Future<Output = Result<Page<T>, RegistryError>>,
    H: FnMut(T),
{
    let mut cursor: Option<Cursor> = None;
    let mut delivered = 0usize;
    let mut page_number = 1u32;

    loop {
        if cancel.is_cancelled() {
            return Err(RegistryError::Cancelled);
        }
        if page_number > 1 {
            info!(page = page_number, delivered, "fetching next page");
        }

        let page = match call_or_cancel(fetch(cursor.clone()), cancel).await {
            Ok(page) => page,
            Err(err) if err.is_no_results() => {
                debug!(page = page_number, "registry reports no objects");
                return Ok(PageScan::from_count(delivered));
            }
            Err(err) => return Err(err),
        };

        delivered += page.items.len();
        page.items.into_iter().for_each(&mut on_item);

        match page.marker {
            PageMarker::LastPage => return Ok(PageScan::from_count(delivered)),
            PageMarker::Next(next) => {
                if cursor.as_ref() == Some(&next) {
                    return Err(RegistryError::protocol(format!(
                        "page {page_number} points back at its own cursor {next}"
                    )));
                }
                cursor = Some(next);
                page_number += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
