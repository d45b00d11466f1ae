//! `PolicyService`: the operations exposed to HTTP handlers.
//!
//! Reads go through the paginator and normalizer; writes go straight to the
//! store as top-level merges. Every store call is bounded by the configured
//! timeout.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use url::Url;

use crate::models::policy::{MediaCoverageItem, PolicyRecord, PolicyStatus, VerificationMethod};
use crate::notify::{dispatch, Notification, NotificationDispatcher};
use crate::policy::error::PolicyError;
use crate::policy::export::{export_csv, ExportLocale};
use crate::policy::normalizer::{clean_topics, normalize, normalize_at, split_topics};
use crate::policy::pagination::{bounded, Page, Paginator};
use crate::policy::query::{FilterSpec, PageLimits, StatusFilter, POLICIES_COLLECTION};
use crate::policy::statistics::{compute_statistics, StatisticsSummary};
use crate::store::{DocumentStore, StoreError};

// ────────────────────────────────────────────────────────────
// Request payloads
// ────────────────────────────────────────────────────────────

/// Topics as submitted: a list, or one comma-separated string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TopicsInput {
    List(Vec<String>),
    Csv(String),
}

impl Default for TopicsInput {
    fn default() -> Self {
        TopicsInput::List(Vec::new())
    }
}

impl TopicsInput {
    fn into_topics(self) -> Vec<String> {
        match self {
            TopicsInput::List(list) => clean_topics(list),
            TopicsInput::Csv(joined) => split_topics(&joined),
        }
    }
}

/// A coverage entry as submitted: structured, or a bare link.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CoverageInput {
    Item(MediaCoverageItem),
    Link(String),
}

impl CoverageInput {
    fn into_item(self) -> MediaCoverageItem {
        match self {
            CoverageInput::Item(item) => item,
            CoverageInput::Link(link) => MediaCoverageItem::from_legacy_link(link.trim()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySubmission {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub agency: String,
    #[serde(default)]
    pub document_url: String,
    #[serde(default)]
    pub impact_summary: String,
    #[serde(default)]
    pub topics: TopicsInput,
    #[serde(default)]
    pub media_coverage: Vec<CoverageInput>,
}

impl PolicySubmission {
    /// Checks every required field and reports all problems at once.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let mut problems = Vec::new();
        for (name, value) in [
            ("title", &self.title),
            ("agency", &self.agency),
            ("impactSummary", &self.impact_summary),
        ] {
            if value.trim().is_empty() {
                problems.push(format!("{name} is required"));
            }
        }

        if self.document_url.trim().is_empty() {
            problems.push("documentUrl is required".to_string());
        } else if !is_web_url(self.document_url.trim()) {
            problems.push("documentUrl must be an http(s) URL".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(PolicyError::Validation(problems))
        }
    }
}

fn is_web_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ────────────────────────────────────────────────────────────
// Service
// ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PolicyService {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    paginator: Paginator,
    store_timeout: Duration,
}

impl PolicyService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        limits: PageLimits,
        store_timeout: Duration,
    ) -> Self {
        Self {
            paginator: Paginator::new(store.clone(), limits, store_timeout),
            store,
            notifier,
            store_timeout,
        }
    }

    pub async fn fetch_page(
        &self,
        filter: &FilterSpec,
        cursor: Option<&str>,
    ) -> Result<Page, PolicyError> {
        self.paginator.fetch_page(filter, cursor).await
    }

    /// Submissions awaiting verification, newest first.
    pub async fn list_pending(
        &self,
        limit: Option<usize>,
        cursor: Option<&str>,
    ) -> Result<Page, PolicyError> {
        let filter = FilterSpec {
            status: Some(StatusFilter::Inactive),
            limit,
            ..Default::default()
        };
        self.paginator.fetch_page(&filter, cursor).await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<PolicyRecord>, PolicyError> {
        let doc = bounded(self.store_timeout, self.store.get(POLICIES_COLLECTION, id)).await?;
        doc.map(|doc| normalize(&doc.id, &doc.data)).transpose()
    }

    /// Stores a new unverified policy and returns its id. Reviewers are
    /// notified in the background once the write has committed.
    pub async fn submit(&self, submission: PolicySubmission) -> Result<String, PolicyError> {
        submission.validate()?;

        let title = submission.title.trim().to_string();
        let agency = submission.agency.trim().to_string();
        let media_coverage: Vec<MediaCoverageItem> = submission
            .media_coverage
            .into_iter()
            .map(CoverageInput::into_item)
            .collect();
        let now = now_rfc3339();

        let mut fields = Map::new();
        fields.insert("title".to_string(), json!(title));
        fields.insert("agency".to_string(), json!(agency));
        fields.insert(
            "documentUrl".to_string(),
            json!(submission.document_url.trim()),
        );
        fields.insert(
            "impactSummary".to_string(),
            json!(submission.impact_summary.trim()),
        );
        fields.insert("status".to_string(), json!(PolicyStatus::Draft.as_str()));
        fields.insert("isVerified".to_string(), json!(false));
        fields.insert("topics".to_string(), json!(submission.topics.into_topics()));
        fields.insert(
            "mediaCoverage".to_string(),
            serde_json::to_value(&media_coverage).map_err(StoreError::from)?,
        );
        fields.insert("expertReviews".to_string(), json!([]));
        fields.insert("createdAt".to_string(), json!(now));
        fields.insert("updatedAt".to_string(), json!(now));

        let id = bounded(self.store_timeout, self.store.add(POLICIES_COLLECTION, fields)).await?;
        info!("Policy {id} submitted by {agency}");

        dispatch(
            self.notifier.clone(),
            Notification::new_submission(&id, &title, &agency),
        );
        Ok(id)
    }

    /// Marks a policy verified in one atomic write: status, flag, verifier
    /// and timestamp land together or not at all.
    pub async fn verify(
        &self,
        id: &str,
        verified_by: &str,
        method: VerificationMethod,
    ) -> Result<(), PolicyError> {
        let verified_by = verified_by.trim();
        if verified_by.is_empty() {
            return Err(PolicyError::validation("verifiedBy is required"));
        }

        let now = now_rfc3339();
        let mut patch = Map::new();
        patch.insert("status".to_string(), json!(PolicyStatus::Active.as_str()));
        patch.insert("isVerified".to_string(), json!(true));
        patch.insert(
            "verificationDetails".to_string(),
            json!({
                "verifiedBy": verified_by,
                "verifiedAt": now,
                "method": method,
            }),
        );
        patch.insert("updatedAt".to_string(), json!(now));

        self.write(id, patch).await?;
        info!("Policy {id} verified by {verified_by}");
        Ok(())
    }

    /// Archival is a status change; the document is kept.
    pub async fn archive(&self, id: &str) -> Result<(), PolicyError> {
        let mut patch = Map::new();
        patch.insert("status".to_string(), json!(PolicyStatus::Archived.as_str()));
        patch.insert("updatedAt".to_string(), json!(now_rfc3339()));

        self.write(id, patch).await?;
        info!("Policy {id} archived");
        Ok(())
    }

    /// Appends a coverage item unless an identical one is already present.
    /// Returns the updated record.
    pub async fn append_media_coverage(
        &self,
        id: &str,
        item: MediaCoverageItem,
    ) -> Result<PolicyRecord, PolicyError> {
        if item.title.trim().is_empty() {
            return Err(PolicyError::validation("title is required"));
        }
        if !is_web_url(item.url.trim()) {
            return Err(PolicyError::validation("url must be an http(s) URL"));
        }

        let mut record = self.require(id).await?;
        if !record.media_coverage.contains(&item) {
            record.media_coverage.push(item);
        }

        let mut patch = Map::new();
        patch.insert(
            "mediaCoverage".to_string(),
            serde_json::to_value(&record.media_coverage).map_err(StoreError::from)?,
        );
        patch.insert("updatedAt".to_string(), json!(now_rfc3339()));
        self.write(id, patch).await?;

        self.require(id).await
    }

    /// Merges topics into the existing list, keeping first occurrences.
    pub async fn append_topics(
        &self,
        id: &str,
        topics: TopicsInput,
    ) -> Result<PolicyRecord, PolicyError> {
        let added = topics.into_topics();
        if added.is_empty() {
            return Err(PolicyError::validation("at least one topic is required"));
        }

        let record = self.require(id).await?;
        let merged = clean_topics(record.topics.iter().chain(added.iter()));

        let mut patch = Map::new();
        patch.insert("topics".to_string(), json!(merged));
        patch.insert("updatedAt".to_string(), json!(now_rfc3339()));
        self.write(id, patch).await?;

        self.require(id).await
    }

    /// CSV of every record matching `filter`, across all pages.
    pub async fn export_csv(
        &self,
        filter: &FilterSpec,
        locale: ExportLocale,
    ) -> Result<String, PolicyError> {
        let records = self.paginator.collect_all(filter).await?;
        info!("Exporting {} policies", records.len());
        Ok(export_csv(&records, locale))
    }

    pub async fn get_statistics(&self) -> Result<StatisticsSummary, PolicyError> {
        let docs = bounded(self.store_timeout, self.store.scan(POLICIES_COLLECTION)).await?;

        // Undated documents take their store position (the epoch) rather than
        // the read time, so they never land in the trailing-week series.
        let records: Vec<PolicyRecord> = docs
            .iter()
            .filter_map(|doc| match normalize_at(&doc.id, &doc.data, doc.created_at) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(id = %doc.id, error = %e, "excluding malformed policy from statistics");
                    None
                }
            })
            .collect();

        Ok(compute_statistics(&records, Utc::now().date_naive()))
    }

    async fn require(&self, id: &str) -> Result<PolicyRecord, PolicyError> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| PolicyError::NotFound(id.to_string()))
    }

    async fn write(&self, id: &str, patch: Map<String, Value>) -> Result<(), PolicyError> {
        match bounded(
            self.store_timeout,
            self.store.update(POLICIES_COLLECTION, id, patch),
        )
        .await
        {
            Err(PolicyError::Store(StoreError::NotFound { .. })) => {
                Err(PolicyError::NotFound(id.to_string()))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::policy::CoverageType;
    use crate::notify::{LogNotifier, NotificationError};
    use crate::policy::test_support::{policy_doc, seeded_store};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn service_with(store: Arc<dyn DocumentStore>, notifier: Arc<dyn NotificationDispatcher>) -> PolicyService {
        PolicyService::new(store, notifier, PageLimits::default(), Duration::from_secs(5))
    }

    fn service() -> PolicyService {
        service_with(Arc::new(MemoryStore::new()), Arc::new(LogNotifier))
    }

    fn submission() -> PolicySubmission {
        serde_json::from_value(json!({
            "title": "X",
            "agency": "Y",
            "documentUrl": "https://a",
            "impactSummary": "z"
        }))
        .unwrap()
    }

    struct Recording(mpsc::UnboundedSender<Notification>);

    #[async_trait]
    impl NotificationDispatcher for Recording {
        async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
            let _ = self.0.send(notification.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl NotificationDispatcher for Failing {
        async fn notify(&self, _: &Notification) -> Result<(), NotificationError> {
            Err(NotificationError::Rejected {
                status: 500,
                message: "down".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_submit_get_verify() {
        let service = service();

        let id = service.submit(submission()).await.unwrap();
        let record = service.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(record.status, PolicyStatus::Draft);
        assert!(!record.is_verified);
        assert!(record.media_coverage.is_empty());

        service
            .verify(&id, "admin1", VerificationMethod::Manual)
            .await
            .unwrap();
        let record = service.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(record.status, PolicyStatus::Active);
        assert!(record.is_verified);
        let details = record.verification_details.unwrap();
        assert_eq!(details.verified_by, "admin1");
        assert!(details.verified_at.is_some());
    }

    #[tokio::test]
    async fn test_submission_appears_in_pending_until_verified() {
        let service = service();
        let id = service.submit(submission()).await.unwrap();

        let pending = service.list_pending(None, None).await.unwrap();
        assert_eq!(pending.records.len(), 1);

        service
            .verify(&id, "admin1", VerificationMethod::Ai)
            .await
            .unwrap();
        assert!(service.list_pending(None, None).await.unwrap().records.is_empty());
    }

    #[tokio::test]
    async fn test_submit_reports_every_missing_field() {
        let err = service()
            .submit(PolicySubmission::default())
            .await
            .unwrap_err();
        let PolicyError::Validation(problems) = err else {
            panic!("expected validation error");
        };
        assert_eq!(problems.len(), 4);
    }

    #[tokio::test]
    async fn test_submit_rejects_non_web_url() {
        let mut bad = submission();
        bad.document_url = "ftp://files.example/x.pdf".to_string();
        assert!(matches!(
            service().submit(bad).await,
            Err(PolicyError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_notifies_reviewers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let service = service_with(Arc::new(MemoryStore::new()), Arc::new(Recording(tx)));

        let id = service.submit(submission()).await.unwrap();
        let sent = rx.recv().await.unwrap();
        assert_eq!(sent.body, "X dari Y membutuhkan verifikasi");
        assert_eq!(sent.data["policyId"], id);
    }

    #[tokio::test]
    async fn test_failing_notifier_does_not_block_submit() {
        let service = service_with(Arc::new(MemoryStore::new()), Arc::new(Failing));
        let id = service.submit(submission()).await.unwrap();
        assert!(service.get_by_id(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_submit_lifts_links_and_splits_topics() {
        let submission: PolicySubmission = serde_json::from_value(json!({
            "title": "X",
            "agency": "Y",
            "documentUrl": "https://a",
            "impactSummary": "z",
            "topics": "pajak, energi, pajak",
            "mediaCoverage": [
                "https://international.example/x",
                {"title": "A", "url": "http://x", "type": "national"}
            ]
        }))
        .unwrap();
        let service = service();
        let id = service.submit(submission).await.unwrap();

        let record = service.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(record.topics, vec!["pajak", "energi"]);
        assert_eq!(record.media_coverage.len(), 2);
        assert_eq!(record.media_coverage[0].coverage_type, CoverageType::International);
        assert_eq!(record.media_coverage[1].coverage_type, CoverageType::National);
    }

    #[tokio::test]
    async fn test_verify_unknown_policy_is_not_found() {
        let err = service()
            .verify("missing", "admin1", VerificationMethod::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::NotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_verify_requires_verifier() {
        let service = service();
        let id = service.submit(submission()).await.unwrap();
        assert!(matches!(
            service.verify(&id, "  ", VerificationMethod::Manual).await,
            Err(PolicyError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_get_unknown_policy_is_none() {
        assert!(service().get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_archive_keeps_document() {
        let service = service();
        let id = service.submit(submission()).await.unwrap();
        service.archive(&id).await.unwrap();

        let record = service.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(record.status, PolicyStatus::Archived);
        assert!(service.list_pending(None, None).await.unwrap().records.is_empty());
    }

    #[tokio::test]
    async fn test_append_media_coverage_upgrades_legacy_entries() {
        let mut doc = policy_doc("T", "A", "2024-01-01");
        doc["mediaCoverage"] = json!(["https://kompas.com/a"]);
        let store = seeded_store(vec![("p1".to_string(), doc)]).await;
        let service = service_with(store, Arc::new(LogNotifier));

        let item: MediaCoverageItem = serde_json::from_value(json!({
            "title": "Liputan",
            "source": "Tempo",
            "url": "https://tempo.co/b",
            "type": "national"
        }))
        .unwrap();
        let record = service
            .append_media_coverage("p1", item.clone())
            .await
            .unwrap();
        assert_eq!(record.media_coverage.len(), 2);

        // the same item again is a no-op
        let record = service.append_media_coverage("p1", item).await.unwrap();
        assert_eq!(record.media_coverage.len(), 2);
        assert_eq!(record.media_coverage[0].url, "https://kompas.com/a");
    }

    #[tokio::test]
    async fn test_append_topics_merges_without_duplicates() {
        let mut doc = policy_doc("T", "A", "2024-01-01");
        doc["tags"] = json!("pajak,energi");
        let store = seeded_store(vec![("p1".to_string(), doc)]).await;
        let service = service_with(store, Arc::new(LogNotifier));

        let record = service
            .append_topics("p1", TopicsInput::List(vec!["energi".into(), "iklim".into()]))
            .await
            .unwrap();
        assert_eq!(record.topics, vec!["pajak", "energi", "iklim"]);
    }

    #[tokio::test]
    async fn test_append_to_missing_policy_is_not_found() {
        let err = service()
            .append_topics("missing", TopicsInput::Csv("a".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_export_walks_all_pages() {
        let docs = (0..15)
            .map(|i| (format!("p{i:02}"), policy_doc(&format!("P{i}"), "A", &format!("2024-02-{:02}", i + 1))))
            .collect();
        let store = seeded_store(docs).await;
        let service = PolicyService::new(
            store,
            Arc::new(LogNotifier),
            PageLimits {
                max_page_size: 4,
                ..Default::default()
            },
            Duration::from_secs(5),
        );

        let csv = service
            .export_csv(&FilterSpec::default(), ExportLocale::Indonesian)
            .await
            .unwrap();
        assert_eq!(csv.lines().count(), 16);
        assert!(csv.lines().nth(1).unwrap().starts_with("\"P14\""));
    }

    #[tokio::test]
    async fn test_statistics_skip_malformed() {
        let store = seeded_store(vec![
            ("a".to_string(), policy_doc("T", "Kemenkeu", "2024-01-01")),
            ("bad".to_string(), json!({"title": 3})),
        ])
        .await;
        let service = service_with(store, Arc::new(LogNotifier));

        let stats = service.get_statistics().await.unwrap();
        assert_eq!(stats.total_policies, 1);
        assert_eq!(stats.inactive_policies, 1);
        assert_eq!(stats.agency_distribution[0].agency, "Kemenkeu");
    }

    #[tokio::test]
    async fn test_undated_policy_not_counted_as_recent() {
        let mut undated = policy_doc("Lama", "Kemenkeu", "2024-01-01");
        undated.as_object_mut().unwrap().remove("createdAt");
        let service = service_with(
            seeded_store(vec![("undated".to_string(), undated)]).await,
            Arc::new(LogNotifier),
        );

        let stats = service.get_statistics().await.unwrap();
        assert_eq!(stats.total_policies, 1);
        assert_eq!(stats.recent_policies.iter().map(|d| d.count).sum::<usize>(), 0);
    }

    #[tokio::test]
    async fn test_pending_includes_marker_only_submissions() {
        let submitted = json!({
            "title": "Q",
            "agency": "A",
            "createdAt": "2024-01-02",
            "verificationStatus": "submitted"
        });
        let verified = json!({
            "title": "R",
            "agency": "A",
            "createdAt": "2024-01-03",
            "verificationStatus": "verified"
        });
        let service = service_with(
            seeded_store(vec![
                ("submitted".to_string(), submitted),
                ("verified".to_string(), verified),
            ])
            .await,
            Arc::new(LogNotifier),
        );

        let pending = service.list_pending(None, None).await.unwrap();
        let ids: Vec<_> = pending.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["submitted"]);

        let stats = service.get_statistics().await.unwrap();
        assert_eq!(stats.active_policies, 1);
        assert_eq!(stats.inactive_policies, 1);
    }
}
