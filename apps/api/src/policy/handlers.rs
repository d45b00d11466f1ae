use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::policy::{MediaCoverageItem, PolicyRecord, VerificationMethod};
use crate::policy::export::{export_file_name, ExportLocale};
use crate::policy::pagination::Page;
use crate::policy::query::{FilterSpec, StatusFilter};
use crate::policy::service::{PolicySubmission, TopicsInput};
use crate::policy::statistics::StatisticsSummary;
use crate::state::AppState;

/// Query string of the list and export endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPoliciesQuery {
    pub status: Option<StatusFilter>,
    pub search_query: Option<String>,
    pub agency: Option<String>,
    pub year: Option<i32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    pub locale: Option<ExportLocale>,
}

impl ListPoliciesQuery {
    fn filter(&self) -> FilterSpec {
        FilterSpec {
            status: self.status,
            search_query: self.search_query.clone(),
            agency: self.agency.clone(),
            year: self.year,
            start_date: self.start_date,
            end_date: self.end_date,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PendingQuery {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub verified_by: String,
    #[serde(default)]
    pub method: VerificationMethod,
}

#[derive(Deserialize)]
pub struct TopicsRequest {
    pub topics: TopicsInput,
}

/// GET /api/v1/policies
pub async fn handle_list_policies(
    State(state): State<AppState>,
    Query(params): Query<ListPoliciesQuery>,
) -> Result<Json<Page>, AppError> {
    let page = state
        .service
        .fetch_page(&params.filter(), params.cursor.as_deref())
        .await?;
    Ok(Json(page))
}

/// GET /api/v1/policies/pending
pub async fn handle_list_pending(
    State(state): State<AppState>,
    Query(params): Query<PendingQuery>,
) -> Result<Json<Page>, AppError> {
    let page = state
        .service
        .list_pending(params.limit, params.cursor.as_deref())
        .await?;
    Ok(Json(page))
}

/// GET /api/v1/policies/:id
pub async fn handle_get_policy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PolicyRecord>, AppError> {
    let record = state
        .service
        .get_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Policy {id} not found")))?;
    Ok(Json(record))
}

/// POST /api/v1/policies
pub async fn handle_submit_policy(
    State(state): State<AppState>,
    Json(req): Json<PolicySubmission>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let id = state.service.submit(req).await?;
    Ok((StatusCode::CREATED, Json(SubmitResponse { id })))
}

/// POST /api/v1/policies/:id/verify
pub async fn handle_verify_policy(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<VerifyRequest>,
) -> Result<StatusCode, AppError> {
    state
        .service
        .verify(&id, &req.verified_by, req.method)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/policies/:id/archive
pub async fn handle_archive_policy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.service.archive(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/policies/:id/media-coverage
pub async fn handle_add_media_coverage(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(item): Json<MediaCoverageItem>,
) -> Result<Json<PolicyRecord>, AppError> {
    let record = state.service.append_media_coverage(&id, item).await?;
    Ok(Json(record))
}

/// POST /api/v1/policies/:id/topics
pub async fn handle_add_topics(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TopicsRequest>,
) -> Result<Json<PolicyRecord>, AppError> {
    let record = state.service.append_topics(&id, req.topics).await?;
    Ok(Json(record))
}

/// GET /api/v1/policies/export
/// Streams the filtered corpus as a CSV attachment.
pub async fn handle_export_policies(
    State(state): State<AppState>,
    Query(params): Query<ListPoliciesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let csv = state
        .service
        .export_csv(&params.filter(), params.locale.unwrap_or_default())
        .await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        export_file_name(Utc::now().date_naive())
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}

/// GET /api/v1/policies/statistics
pub async fn handle_policy_statistics(
    State(state): State<AppState>,
) -> Result<Json<StatisticsSummary>, AppError> {
    Ok(Json(state.service.get_statistics().await?))
}
