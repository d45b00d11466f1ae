//! Export Serializer: flattens normalized records into CSV text.
//!
//! The layout matches what earlier exports produced: an unquoted header row,
//! then every cell wrapped in double quotes with no escaping, rows joined by
//! `\n` and no trailing newline.

use chrono::{DateTime, Locale, NaiveDate, Utc};
use serde::Deserialize;

use crate::models::policy::{PolicyRecord, PolicyStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportLocale {
    #[default]
    #[serde(alias = "id")]
    Indonesian,
    #[serde(alias = "en")]
    English,
}

struct Labels {
    headers: [&'static str; 10],
    active: &'static str,
    inactive: &'static str,
    locale: Locale,
}

impl ExportLocale {
    fn labels(self) -> Labels {
        match self {
            ExportLocale::Indonesian => Labels {
                headers: [
                    "Judul",
                    "Instansi",
                    "Link Dokumen",
                    "Ringkasan Dampak",
                    "Liputan Media",
                    "Status",
                    "Tanggal Dibuat",
                    "Tanggal Diperbarui",
                    "Diverifikasi Oleh",
                    "Tanggal Verifikasi",
                ],
                active: "Aktif",
                inactive: "Tidak Aktif",
                locale: Locale::id_ID,
            },
            ExportLocale::English => Labels {
                headers: [
                    "Title",
                    "Agency",
                    "Document Link",
                    "Impact Summary",
                    "Media Coverage",
                    "Status",
                    "Created Date",
                    "Updated Date",
                    "Verified By",
                    "Verification Date",
                ],
                active: "Active",
                inactive: "Inactive",
                locale: Locale::en_US,
            },
        }
    }
}

const MISSING: &str = "-";

pub fn export_csv(records: &[PolicyRecord], locale: ExportLocale) -> String {
    let labels = locale.labels();
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(labels.headers.join(","));

    for record in records {
        let verification = record.verification_details.as_ref();
        let cells = [
            record.title.clone(),
            record.agency.clone(),
            record.document_url.clone().unwrap_or_default(),
            record.impact_summary.clone(),
            record
                .media_coverage
                .iter()
                .map(|item| item.display_link())
                .collect::<Vec<_>>()
                .join("; "),
            match record.status {
                PolicyStatus::Active => labels.active.to_string(),
                _ => labels.inactive.to_string(),
            },
            long_date(record.created_at, labels.locale),
            long_date(record.updated_at, labels.locale),
            verification
                .map(|v| v.verified_by.clone())
                .filter(|by| !by.is_empty())
                .unwrap_or_else(|| MISSING.to_string()),
            verification
                .and_then(|v| v.verified_at)
                .map(|at| long_date(at, labels.locale))
                .unwrap_or_else(|| MISSING.to_string()),
        ];

        let row: Vec<String> = cells.iter().map(|cell| format!("\"{cell}\"")).collect();
        lines.push(row.join(","));
    }

    lines.join("\n")
}

/// `kebijakan_YYYY-MM-DD.csv`
pub fn export_file_name(date: NaiveDate) -> String {
    format!("kebijakan_{}.csv", date.format("%Y-%m-%d"))
}

fn long_date(at: DateTime<Utc>, locale: Locale) -> String {
    at.format_localized("%-d %B %Y", locale).to_string()
}
