//! Pagination Controller: executes query plans, normalizes results and
//! computes the continuation cursor.
//!
//! Holds no mutable state: concurrent calls with independent cursors are
//! safe and may complete in any order. Dropping a pending `fetch_page` future
//! abandons the (read-only) store call without side effects.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::models::policy::PolicyRecord;
use crate::policy::cursor::PageCursor;
use crate::policy::error::PolicyError;
use crate::policy::normalizer::normalize_at;
use crate::policy::query::{build_query_plan, FilterSpec, PageLimits, QueryPlan};
use crate::store::{DocumentStore, StoreError, StoredDocument};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub records: Vec<PolicyRecord>,
    pub next_cursor: Option<PageCursor>,
    /// Documents dropped because they could not be normalized.
    pub skipped: usize,
}

#[derive(Clone)]
pub struct Paginator {
    store: Arc<dyn DocumentStore>,
    limits: PageLimits,
    store_timeout: Duration,
}

impl Paginator {
    pub fn new(store: Arc<dyn DocumentStore>, limits: PageLimits, store_timeout: Duration) -> Self {
        Self {
            store,
            limits,
            store_timeout,
        }
    }

    /// Fetches one page. `searchQuery` is applied after normalization, so a
    /// page can hold fewer records than requested even when more exist.
    pub async fn fetch_page(
        &self,
        filter: &FilterSpec,
        cursor: Option<&str>,
    ) -> Result<Page, PolicyError> {
        let plan = build_query_plan(filter, cursor, &self.limits)?;
        debug!(?plan, "executing policy query");

        let docs = bounded(self.store_timeout, self.store.query(&plan)).await?;
        assemble_page(&plan, docs, filter.search_needle().as_deref(), Utc::now())
    }

    /// Walks every page of `filter` and concatenates the records. Unreadable
    /// pages are logged and stepped over.
    pub async fn collect_all(&self, filter: &FilterSpec) -> Result<Vec<PolicyRecord>, PolicyError> {
        let mut filter = filter.clone();
        filter.limit = Some(self.limits.max_page_size);

        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let next_cursor = match self.fetch_page(&filter, cursor.as_deref()).await {
                Ok(page) => {
                    records.extend(page.records);
                    page.next_cursor
                }
                Err(PolicyError::PageUnreadable {
                    skipped,
                    next_cursor,
                }) => {
                    warn!(skipped, "stepping over a page of malformed policy records");
                    next_cursor
                }
                Err(e) => return Err(e),
            };
            match next_cursor {
                Some(next) => cursor = Some(next.encode()),
                None => break,
            }
        }
        Ok(records)
    }
}

/// Runs a store call under `timeout`, reporting expiry as the store being
/// unavailable. The core never retries; callers decide on backoff.
pub async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, PolicyError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(StoreError::Unavailable(format!(
            "store call exceeded {}ms",
            timeout.as_millis()
        ))
        .into()),
    }
}

/// Turns raw store documents into a page.
///
/// With look-ahead the store was asked for `page_size + 1` documents and more
/// pages exist exactly when it returned that many. Without it, a full page is
/// taken as "maybe more": when the remaining collection exactly fills the page
/// the caller gets a cursor that resolves to an empty page.
///
/// The cursor comes from the last store document kept, not the last record
/// returned, so skipped or search-filtered documents are never rescanned. A
/// page where nothing normalized is an error that still carries that cursor.
fn assemble_page(
    plan: &QueryPlan,
    mut docs: Vec<StoredDocument>,
    search_needle: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Page, PolicyError> {
    let has_more = if plan.uses_lookahead() {
        docs.len() > plan.page_size
    } else {
        docs.len() == plan.page_size
    };
    docs.truncate(plan.page_size);

    let next_cursor = if has_more {
        docs.last().map(|doc| PageCursor::after(doc.sort_key()))
    } else {
        None
    };

    let fetched = docs.len();
    let mut records = Vec::with_capacity(fetched);
    let mut skipped = 0;
    for doc in &docs {
        match normalize_at(&doc.id, &doc.data, now) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                warn!(id = %doc.id, error = %e, "skipping malformed policy record");
            }
        }
    }

    if fetched > 0 && skipped == fetched {
        return Err(PolicyError::PageUnreadable {
            skipped,
            next_cursor,
        });
    }

    if let Some(needle) = search_needle {
        records.retain(|record| record.matches_search(needle));
    }

    Ok(Page {
        records,
        next_cursor,
        skipped,
    })
}
