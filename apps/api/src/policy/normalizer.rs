//! Record Normalizer: converts raw stored documents into canonical
//! [`PolicyRecord`]s.
//!
//! Stored documents come from several generations of the submission flow and
//! disagree on shape: media coverage is either bare link strings or objects,
//! timestamps are store wrappers or strings, status is `active`/`inactive` or
//! the upper-case enumeration, topics are a list or one comma-joined string.
//! Every field is decoded independently so that a failure reports all
//! offending field names at once.
//!
//! Normalization is pure and idempotent: feeding [`PolicyRecord::to_document`]
//! back through [`normalize`] yields the same record.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::models::policy::{
    CoverageType, ExpertReview, MediaCoverageItem, PolicyRecord, PolicyStatus, ReviewStatus,
    Sentiment, VerificationDetails, VerificationMethod,
};
use crate::policy::error::PolicyError;
use crate::policy::timestamp::{decode_instant, RawInstant};

/// Normalizes one stored document, using the current time for missing
/// creation/update instants.
pub fn normalize(id: &str, raw: &Value) -> Result<PolicyRecord, PolicyError> {
    normalize_at(id, raw, Utc::now())
}

/// Normalizes one stored document. `now` stands in for a missing `createdAt`
/// or `updatedAt` (legacy documents written before those fields existed).
pub fn normalize_at(id: &str, raw: &Value, now: DateTime<Utc>) -> Result<PolicyRecord, PolicyError> {
    let Some(doc) = raw.as_object() else {
        return Err(PolicyError::MalformedRecord {
            id: id.to_string(),
            fields: vec!["<document>".to_string()],
        });
    };

    let mut reader = FieldReader::new(doc);

    let title = reader.required_text("title");
    let agency = reader.required_text("agency");
    let impact_summary = reader
        .optional_text(&["impactSummary", "description", "summary"])
        .unwrap_or_default();
    let document_url = reader.optional_text(&["documentUrl", "officialDocumentLink"]);
    let status = reader.status();
    let is_verified = reader
        .optional_bool("isVerified")
        .unwrap_or(status == PolicyStatus::Active);
    let verification_details = reader.verification_details();
    let created_at = reader.instant(&["createdAt"]).unwrap_or(now);
    let updated_at = reader.instant(&["updatedAt"]).unwrap_or(now);
    let effective_date = reader.instant(&["effectiveDate"]);
    let end_date = reader.instant(&["endDate", "expiryDate"]);
    let topics = reader.topics();
    let media_coverage = reader.media_coverage();
    let expert_reviews = reader.expert_reviews();
    let contributors = reader.counter(&["contributors", "contributorCount"]);
    let views = reader.counter(&["views", "viewCount"]);
    let bookmarks = reader.counter(&["bookmarks", "bookmarkCount"]);

    match (title, agency) {
        (Some(title), Some(agency)) if reader.bad_fields.is_empty() => Ok(PolicyRecord {
            id: id.to_string(),
            title,
            agency,
            impact_summary,
            status,
            is_verified,
            verification_details,
            created_at,
            updated_at,
            effective_date,
            end_date,
            topics,
            media_coverage,
            expert_reviews,
            document_url,
            contributors,
            views,
            bookmarks,
        }),
        _ => Err(PolicyError::MalformedRecord {
            id: id.to_string(),
            fields: reader.bad_fields,
        }),
    }
}

/// Status a stored document resolves to, or `None` when its `status` field
/// is present but unreadable.
pub fn effective_status(data: &Value) -> Option<PolicyStatus> {
    let doc = data.as_object()?;
    match doc.get("status") {
        None | Some(Value::Null) => Some(unstated_status(doc)),
        Some(Value::String(s)) => parse_status(s),
        Some(_) => None,
    }
}

// Documents from the verification-queue flow carry no status, only a
// verification marker.
fn unstated_status(doc: &Map<String, Value>) -> PolicyStatus {
    let verified = doc.get("verificationStatus").and_then(Value::as_str) == Some("verified")
        || doc.get("isVerified").and_then(Value::as_bool) == Some(true);
    if verified {
        PolicyStatus::Active
    } else {
        PolicyStatus::Draft
    }
}

/// Maps a stored status string onto the enumeration. Legacy lower-case
/// `active`/`inactive` come first; anything else must match once uppercased.
pub fn parse_status(raw: &str) -> Option<PolicyStatus> {
    match raw {
        "active" => Some(PolicyStatus::Active),
        "inactive" => Some(PolicyStatus::Draft),
        other => match other.trim().to_uppercase().as_str() {
            "DRAFT" => Some(PolicyStatus::Draft),
            "ACTIVE" => Some(PolicyStatus::Active),
            "ARCHIVED" => Some(PolicyStatus::Archived),
            _ => None,
        },
    }
}

/// Trims, drops blanks and deduplicates, keeping first occurrences in order.
pub fn clean_topics<I, S>(topics: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut cleaned: Vec<String> = Vec::new();
    for topic in topics {
        let topic = topic.as_ref().trim();
        if !topic.is_empty() && !cleaned.iter().any(|t| t == topic) {
            cleaned.push(topic.to_string());
        }
    }
    cleaned
}

/// Splits the legacy comma-joined topic string.
pub fn split_topics(joined: &str) -> Vec<String> {
    clean_topics(joined.split(','))
}

// ────────────────────────────────────────────────────────────────────────────
// Field reader
// ────────────────────────────────────────────────────────────────────────────

/// Reads fields off one document, recording the name of every field whose
/// shape it cannot accept. `null` is treated the same as an absent key.
struct FieldReader<'a> {
    doc: &'a Map<String, Value>,
    bad_fields: Vec<String>,
}

impl<'a> FieldReader<'a> {
    fn new(doc: &'a Map<String, Value>) -> Self {
        Self {
            doc,
            bad_fields: Vec::new(),
        }
    }

    /// First present, non-null key among `keys`.
    fn lookup(&self, keys: &[&'static str]) -> Option<(&'static str, &'a Value)> {
        keys.iter().find_map(|key| match self.doc.get(*key) {
            None | Some(Value::Null) => None,
            Some(v) => Some((*key, v)),
        })
    }

    fn reject(&mut self, field: impl Into<String>) {
        self.bad_fields.push(field.into());
    }

    fn required_text(&mut self, key: &'static str) -> Option<String> {
        match self.lookup(&[key]) {
            Some((_, Value::String(s))) if !s.trim().is_empty() => Some(s.clone()),
            _ => {
                self.reject(key);
                None
            }
        }
    }

    fn optional_text(&mut self, keys: &[&'static str]) -> Option<String> {
        match self.lookup(keys) {
            None => None,
            Some((_, Value::String(s))) => Some(s.clone()),
            Some((key, _)) => {
                self.reject(key);
                None
            }
        }
    }

    fn optional_bool(&mut self, key: &'static str) -> Option<bool> {
        match self.lookup(&[key]) {
            None => None,
            Some((_, Value::Bool(b))) => Some(*b),
            Some((key, _)) => {
                self.reject(key);
                None
            }
        }
    }

    fn instant(&mut self, keys: &[&'static str]) -> Option<DateTime<Utc>> {
        let (key, value) = self.lookup(keys)?;
        match decode_instant(Some(value)) {
            Ok(instant) => instant,
            Err(_) => {
                self.reject(key);
                None
            }
        }
    }

    fn status(&mut self) -> PolicyStatus {
        match self.lookup(&["status"]) {
            Some((_, Value::String(s))) => match parse_status(s) {
                Some(status) => status,
                None => {
                    self.reject("status");
                    PolicyStatus::Draft
                }
            },
            Some(_) => {
                self.reject("status");
                PolicyStatus::Draft
            }
            None => unstated_status(self.doc),
        }
    }

    fn verification_details(&mut self) -> Option<VerificationDetails> {
        if let Some((key, value)) = self.lookup(&["verificationDetails"]) {
            return match serde_json::from_value::<RawVerification>(value.clone()) {
                Ok(raw) => match raw.resolve() {
                    Some(details) => Some(details),
                    None => {
                        self.reject(key);
                        None
                    }
                },
                Err(_) => {
                    self.reject(key);
                    None
                }
            };
        }

        // Older documents keep the verifier at the top level.
        let verified_by = self.optional_text(&["verifiedBy"])?;
        let verified_at = self.instant(&["verifiedAt"]);
        Some(VerificationDetails {
            verified_by,
            verified_at,
            method: VerificationMethod::Manual,
        })
    }

    fn topics(&mut self) -> Vec<String> {
        match self.lookup(&["topics", "tags"]) {
            None => Vec::new(),
            Some((_, Value::String(joined))) => split_topics(joined),
            Some((key, Value::Array(items))) => {
                let texts: Option<Vec<&str>> = items.iter().map(Value::as_str).collect();
                match texts {
                    Some(texts) => clean_topics(texts),
                    None => {
                        self.reject(key);
                        Vec::new()
                    }
                }
            }
            Some((key, _)) => {
                self.reject(key);
                Vec::new()
            }
        }
    }

    fn media_coverage(&mut self) -> Vec<MediaCoverageItem> {
        let items = match self.lookup(&["mediaCoverage"]) {
            None => return Vec::new(),
            Some((_, Value::Array(items))) => items,
            Some((key, _)) => {
                self.reject(key);
                return Vec::new();
            }
        };

        let mut coverage = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match decode_coverage(item) {
                Some(decoded) => coverage.push(decoded),
                None => self.reject(format!("mediaCoverage[{i}]")),
            }
        }
        coverage
    }

    fn expert_reviews(&mut self) -> Vec<ExpertReview> {
        let items = match self.lookup(&["expertReviews"]) {
            None => return Vec::new(),
            Some((_, Value::Array(items))) => items,
            Some((key, _)) => {
                self.reject(key);
                return Vec::new();
            }
        };

        let mut reviews = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match serde_json::from_value::<RawExpertReview>(item.clone())
                .ok()
                .and_then(RawExpertReview::resolve)
            {
                Some(review) => reviews.push(review),
                None => self.reject(format!("expertReviews[{i}]")),
            }
        }
        reviews
    }

    fn counter(&mut self, keys: &[&'static str]) -> u64 {
        let Some((key, value)) = self.lookup(keys) else {
            return 0;
        };
        let parsed = value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f.trunc() as u64)
        });
        match parsed {
            Some(n) => n,
            None => {
                self.reject(key);
                0
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tagged decoding of nested shapes
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCoverage {
    Structured(RawCoverageFields),
    Legacy(String),
}

#[derive(Debug, Deserialize)]
struct RawCoverageFields {
    #[serde(default)]
    title: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    url: String,
    #[serde(default, alias = "publishedAt")]
    date: Option<RawInstant>,
    #[serde(default, rename = "type")]
    coverage_type: Option<CoverageType>,
    #[serde(default)]
    sentiment: Option<Sentiment>,
}

fn decode_coverage(item: &Value) -> Option<MediaCoverageItem> {
    match serde_json::from_value::<RawCoverage>(item.clone()).ok()? {
        RawCoverage::Legacy(link) => Some(MediaCoverageItem::from_legacy_link(&link)),
        RawCoverage::Structured(fields) => {
            let date = match &fields.date {
                Some(raw) => Some(raw.resolve()?),
                None => None,
            };
            Some(MediaCoverageItem {
                title: fields.title,
                source: fields.source,
                url: fields.url,
                date,
                coverage_type: fields.coverage_type.unwrap_or(CoverageType::Local),
                sentiment: fields.sentiment,
            })
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVerification {
    verified_by: String,
    #[serde(default)]
    verified_at: Option<RawInstant>,
    #[serde(default)]
    method: Option<VerificationMethod>,
}

impl RawVerification {
    fn resolve(self) -> Option<VerificationDetails> {
        let verified_at = match &self.verified_at {
            Some(raw) => Some(raw.resolve()?),
            None => None,
        };
        Some(VerificationDetails {
            verified_by: self.verified_by,
            verified_at,
            method: self.method.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExpertReview {
    #[serde(default, alias = "reviewerName")]
    expert_name: Option<String>,
    #[serde(default)]
    expertise: Option<String>,
    #[serde(default, alias = "organization")]
    institution: Option<String>,
    #[serde(default, alias = "content")]
    review: Option<String>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    date: Option<RawInstant>,
    #[serde(default)]
    verification_status: Option<ReviewStatus>,
    #[serde(default)]
    is_verified: Option<bool>,
    #[serde(default)]
    expert: Option<RawExpert>,
}

/// Reviewer block used by seeded documents.
#[derive(Debug, Default, Deserialize)]
struct RawExpert {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    specialization: Option<String>,
}

impl RawExpertReview {
    fn resolve(self) -> Option<ExpertReview> {
        let date = match &self.date {
            Some(raw) => Some(raw.resolve()?),
            None => None,
        };
        let expert = self.expert.unwrap_or_default();
        let verification_status = match (self.verification_status, self.is_verified) {
            (Some(status), _) => status,
            (None, Some(true)) => ReviewStatus::Verified,
            (None, _) => ReviewStatus::Pending,
        };
        Some(ExpertReview {
            expert_name: self.expert_name.or(expert.name).unwrap_or_default(),
            expertise: self
                .expertise
                .or(expert.title)
                .or(expert.specialization)
                .unwrap_or_default(),
            institution: self.institution.unwrap_or_default(),
            review: self.review.unwrap_or_default(),
            rating: self.rating.unwrap_or(0.0),
            date,
            verification_status,
        })
    }
}
