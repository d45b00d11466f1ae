//! Query Builder: translates a [`FilterSpec`] and optional cursor into a
//! store-agnostic [`QueryPlan`].
//!
//! Only exact-match and range predicates reach the store. Free-text search is
//! applied after normalization because the store has no full-text index.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::models::policy::PolicyStatus;
use crate::policy::cursor::{PageCursor, SortKey};
use crate::policy::error::PolicyError;
use crate::policy::normalizer::effective_status;

pub const POLICIES_COLLECTION: &str = "policies";

/// Public-facing status filter. Matching is on the status a document
/// normalizes to, so legacy spellings and documents that carry only a
/// verification marker are covered too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    Active,
    Inactive,
}

impl StatusFilter {
    /// "inactive" means not yet verified; archived policies match neither.
    pub fn status(&self) -> PolicyStatus {
        match self {
            StatusFilter::Active => PolicyStatus::Active,
            StatusFilter::Inactive => PolicyStatus::Draft,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    pub status: Option<StatusFilter>,
    pub search_query: Option<String>,
    pub agency: Option<String>,
    pub year: Option<i32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl FilterSpec {
    /// Lowercased, trimmed search needle, if any.
    pub fn search_needle(&self) -> Option<String> {
        self.search_query
            .as_deref()
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Top-level document field equals `value`.
    Equals { field: String, value: Value },
    /// Document resolves to the filter's status (see [`effective_status`]).
    StatusIs(StatusFilter),
    /// Creation instant in `[from, until)`; either bound may be open.
    CreatedWithin {
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    },
}

impl Predicate {
    /// Evaluates the predicate against one stored document. Store adapters
    /// without a native query language use this directly.
    pub fn matches(&self, created_at: DateTime<Utc>, data: &Value) -> bool {
        match self {
            Predicate::Equals { field, value } => data.get(field) == Some(value),
            Predicate::StatusIs(filter) => effective_status(data) == Some(filter.status()),
            Predicate::CreatedWithin { from, until } => {
                from.map_or(true, |from| created_at >= from)
                    && until.map_or(true, |until| created_at < until)
            }
        }
    }
}

/// The single supported ordering: creation instant descending, id descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    CreatedAtDesc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub collection: String,
    pub predicates: Vec<Predicate>,
    pub order: SortOrder,
    /// Records the caller asked for.
    pub page_size: usize,
    /// Documents to request from the store; `page_size + 1` with look-ahead.
    pub fetch_limit: usize,
    pub resume_after: Option<SortKey>,
}

impl QueryPlan {
    pub fn uses_lookahead(&self) -> bool {
        self.fetch_limit > self.page_size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Fetch one extra document per page to tell exactly whether more exist.
    pub lookahead: bool,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
            lookahead: true,
        }
    }
}

pub fn build_query_plan(
    filter: &FilterSpec,
    cursor: Option<&str>,
    limits: &PageLimits,
) -> Result<QueryPlan, PolicyError> {
    let page_size = match filter.limit {
        Some(0) => return Err(PolicyError::validation("limit must be at least 1")),
        Some(n) => n.min(limits.max_page_size),
        None => limits.default_page_size,
    };

    let mut predicates = Vec::new();

    if let Some(status) = filter.status {
        predicates.push(Predicate::StatusIs(status));
    }

    if let Some(agency) = filter.agency.as_deref().filter(|a| !a.trim().is_empty()) {
        predicates.push(Predicate::Equals {
            field: "agency".to_string(),
            value: Value::from(agency),
        });
    }

    if let Some(range) = creation_range(filter)? {
        predicates.push(range);
    }

    let resume_after = cursor
        .map(PageCursor::decode)
        .transpose()?
        .map(|c| c.sort_key().clone());

    Ok(QueryPlan {
        collection: POLICIES_COLLECTION.to_string(),
        predicates,
        order: SortOrder::CreatedAtDesc,
        page_size,
        fetch_limit: if limits.lookahead { page_size + 1 } else { page_size },
        resume_after,
    })
}

fn creation_range(filter: &FilterSpec) -> Result<Option<Predicate>, PolicyError> {
    if let Some(year) = filter.year {
        if filter.start_date.is_some() || filter.end_date.is_some() {
            return Err(PolicyError::validation(
                "year cannot be combined with startDate/endDate",
            ));
        }
        let from = year_start(year)
            .ok_or_else(|| PolicyError::validation(format!("year {year} is out of range")))?;
        let until = year_start(year + 1)
            .ok_or_else(|| PolicyError::validation(format!("year {year} is out of range")))?;
        return Ok(Some(Predicate::CreatedWithin {
            from: Some(from),
            until: Some(until),
        }));
    }

    match (filter.start_date, filter.end_date) {
        (None, None) => Ok(None),
        (Some(from), Some(until)) if from > until => Err(PolicyError::validation(
            "startDate must not be after endDate",
        )),
        (from, until) => Ok(Some(Predicate::CreatedWithin { from, until })),
    }
}

fn year_start(year: i32) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}
