use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a policy. Archival is a status, never a deletion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyStatus {
    Draft,
    Active,
    Archived,
}

impl PolicyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyStatus::Draft => "DRAFT",
            PolicyStatus::Active => "ACTIVE",
            PolicyStatus::Archived => "ARCHIVED",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationMethod {
    #[default]
    Manual,
    Ai,
    BlockchainHash,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationDetails {
    pub verified_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    pub method: VerificationMethod,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CoverageType {
    National,
    International,
    Local,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaCoverageItem {
    pub title: String,
    #[serde(default)]
    pub source: String,
    pub url: String,
    #[serde(default, alias = "publishedAt", skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub coverage_type: CoverageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
}

impl MediaCoverageItem {
    /// Lifts a legacy bare-string coverage entry. The string doubles as title
    /// and url; classification is a substring check kept for compatibility.
    pub fn from_legacy_link(link: &str) -> Self {
        let coverage_type = if link.contains("international") {
            CoverageType::International
        } else {
            CoverageType::Local
        };
        Self {
            title: link.to_string(),
            source: String::new(),
            url: link.to_string(),
            date: None,
            coverage_type,
            sentiment: None,
        }
    }

    /// The text shown for this item in flat exports.
    pub fn display_link(&self) -> &str {
        if self.url.is_empty() {
            &self.title
        } else {
            &self.url
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExpertReview {
    pub expert_name: String,
    pub expertise: String,
    pub institution: String,
    pub review: String,
    pub rating: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    pub verification_status: ReviewStatus,
}

/// Canonical, normalized policy. Produced only by the record normalizer.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRecord {
    pub id: String,
    pub title: String,
    pub agency: String,
    pub impact_summary: String,
    pub status: PolicyStatus,
    pub is_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_details: Option<VerificationDetails>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    pub topics: Vec<String>,
    pub media_coverage: Vec<MediaCoverageItem>,
    pub expert_reviews: Vec<ExpertReview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
    pub contributors: u64,
    pub views: u64,
    pub bookmarks: u64,
}

impl PolicyRecord {
    /// Canonical stored shape of this record, without the id (the store keys it).
    pub fn to_document(&self) -> Result<Value, serde_json::Error> {
        let mut doc = serde_json::to_value(self)?;
        if let Some(map) = doc.as_object_mut() {
            map.remove("id");
        }
        Ok(doc)
    }

    /// Case-insensitive substring match on title, agency and impact summary.
    /// `needle` must already be lowercased.
    pub fn matches_search(&self, needle: &str) -> bool {
        [&self.title, &self.agency, &self.impact_summary]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_link_classified_international_by_substring() {
        let item = MediaCoverageItem::from_legacy_link("https://news.example/international/ruu");
        assert_eq!(item.coverage_type, CoverageType::International);
        assert_eq!(item.title, item.url);
    }

    #[test]
    fn test_legacy_link_defaults_to_local() {
        let item = MediaCoverageItem::from_legacy_link("http://intl.example/x");
        assert_eq!(item.coverage_type, CoverageType::Local);
        assert!(item.source.is_empty());
    }

    #[test]
    fn test_display_link_falls_back_to_title() {
        let mut item = MediaCoverageItem::from_legacy_link("https://a.example");
        item.url.clear();
        assert_eq!(item.display_link(), "https://a.example");
    }

    #[test]
    fn test_verification_method_wire_names() {
        assert_eq!(
            serde_json::to_value(VerificationMethod::BlockchainHash).unwrap(),
            "blockchain-hash"
        );
        assert_eq!(serde_json::to_value(PolicyStatus::Archived).unwrap(), "ARCHIVED");
    }
}
