//! Point-in-time summary of the policy collection.

use chrono::{Days, Locale, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::models::policy::{PolicyRecord, PolicyStatus};

const TOP_AGENCIES: usize = 5;
const TRAILING_DAYS: u64 = 7;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgencyShare {
    pub agency: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyCount {
    pub date: NaiveDate,
    /// `d MMM` in Indonesian, e.g. `28 Mei`.
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSummary {
    pub total_policies: usize,
    pub active_policies: usize,
    pub inactive_policies: usize,
    pub agency_distribution: Vec<AgencyShare>,
    pub recent_policies: Vec<DailyCount>,
}

/// Summarizes `records` as of the UTC day `today`.
pub fn compute_statistics(records: &[PolicyRecord], today: NaiveDate) -> StatisticsSummary {
    let total = records.len();
    let active = records
        .iter()
        .filter(|r| r.status == PolicyStatus::Active)
        .count();
    let inactive = records
        .iter()
        .filter(|r| r.status == PolicyStatus::Draft)
        .count();

    StatisticsSummary {
        total_policies: total,
        active_policies: active,
        inactive_policies: inactive,
        agency_distribution: agency_distribution(records),
        recent_policies: recent_counts(records, today),
    }
}

fn agency_distribution(records: &[PolicyRecord]) -> Vec<AgencyShare> {
    let total = records.len();
    if total == 0 {
        return Vec::new();
    }

    // first-encounter order; the stable sort below keeps it for ties
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for record in records {
        match counts.iter_mut().find(|(agency, _)| *agency == record.agency) {
            Some((_, count)) => *count += 1,
            None => counts.push((record.agency.as_str(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    counts
        .into_iter()
        .take(TOP_AGENCIES)
        .map(|(agency, count)| AgencyShare {
            agency: agency.to_string(),
            count,
            percentage: count as f64 / total as f64 * 100.0,
        })
        .collect()
}

fn recent_counts(records: &[PolicyRecord], today: NaiveDate) -> Vec<DailyCount> {
    (0..TRAILING_DAYS)
        .rev()
        .filter_map(|back| today.checked_sub_days(Days::new(back)))
        .map(|day| DailyCount {
            date: day,
            label: day_label(day),
            count: records
                .iter()
                .filter(|r| r.created_at.date_naive() == day)
                .count(),
        })
        .collect()
}

fn day_label(day: NaiveDate) -> String {
    match day.and_hms_opt(0, 0, 0) {
        Some(midnight) => Utc
            .from_utc_datetime(&midnight)
            .format_localized("%-d %b", Locale::id_ID)
            .to_string(),
        None => day.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn record(agency: &str, status: PolicyStatus, created_at: DateTime<Utc>) -> PolicyRecord {
        PolicyRecord {
            id: format!("{agency}-{}", created_at.timestamp()),
            title: "T".to_string(),
            agency: agency.to_string(),
            impact_summary: String::new(),
            status,
            is_verified: false,
            verification_details: None,
            created_at,
            updated_at: created_at,
            effective_date: None,
            end_date: None,
            topics: vec![],
            media_coverage: vec![],
            expert_reviews: vec![],
            document_url: None,
            contributors: 0,
            views: 0,
            bookmarks: 0,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_zero_total() {
        let stats = compute_statistics(&[], day(28));
        assert_eq!(stats.total_policies, 0);
        assert_eq!(stats.active_policies, 0);
        assert_eq!(stats.inactive_policies, 0);
        assert!(stats.agency_distribution.is_empty());
        assert_eq!(stats.recent_policies.len(), 7);
        assert!(stats.recent_policies.iter().all(|d| d.count == 0));
    }

    #[test]
    fn test_status_counts_ignore_archived() {
        let records = vec![
            record("A", PolicyStatus::Active, at(1, 0)),
            record("A", PolicyStatus::Draft, at(1, 1)),
            record("A", PolicyStatus::Archived, at(1, 2)),
        ];
        let stats = compute_statistics(&records, day(28));
        assert_eq!(stats.total_policies, 3);
        assert_eq!(stats.active_policies, 1);
        assert_eq!(stats.inactive_policies, 1);
    }

    #[test]
    fn test_top_five_agencies_ties_by_first_encounter() {
        let mut records = Vec::new();
        for (i, agency) in ["F", "E", "D", "C", "B", "A", "A", "B"].iter().enumerate() {
            records.push(record(agency, PolicyStatus::Active, at(1, i as u32)));
        }
        let stats = compute_statistics(&records, day(28));
        let agencies: Vec<_> = stats
            .agency_distribution
            .iter()
            .map(|s| s.agency.as_str())
            .collect();
        assert_eq!(agencies, vec!["B", "A", "F", "E", "D"]);
        assert_eq!(stats.agency_distribution[0].count, 2);
        assert!((stats.agency_distribution[0].percentage - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_trailing_week_oldest_first() {
        let records = vec![
            record("A", PolicyStatus::Active, at(28, 23)),
            record("A", PolicyStatus::Active, at(28, 0)),
            record("A", PolicyStatus::Active, at(22, 12)),
            // outside the window
            record("A", PolicyStatus::Active, at(21, 12)),
        ];
        let stats = compute_statistics(&records, day(28));
        let recent = &stats.recent_policies;
        assert_eq!(recent.first().unwrap().date, day(22));
        assert_eq!(recent.first().unwrap().count, 1);
        assert_eq!(recent.last().unwrap().date, day(28));
        assert_eq!(recent.last().unwrap().count, 2);
        assert_eq!(recent.last().unwrap().label, "28 Mei");
        assert_eq!(recent.iter().map(|d| d.count).sum::<usize>(), 3);
    }
}
