pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::policy::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Policy API
        .route(
            "/api/v1/policies",
            get(handlers::handle_list_policies).post(handlers::handle_submit_policy),
        )
        .route("/api/v1/policies/pending", get(handlers::handle_list_pending))
        .route(
            "/api/v1/policies/export",
            get(handlers::handle_export_policies),
        )
        .route(
            "/api/v1/policies/statistics",
            get(handlers::handle_policy_statistics),
        )
        .route("/api/v1/policies/:id", get(handlers::handle_get_policy))
        .route(
            "/api/v1/policies/:id/verify",
            post(handlers::handle_verify_policy),
        )
        .route(
            "/api/v1/policies/:id/archive",
            post(handlers::handle_archive_policy),
        )
        .route(
            "/api/v1/policies/:id/media-coverage",
            post(handlers::handle_add_media_coverage),
        )
        .route(
            "/api/v1/policies/:id/topics",
            post(handlers::handle_add_topics),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::notify::LogNotifier;
    use crate::policy::service::PolicyService;
    use crate::policy::test_support::{policy_doc, seeded_store};

    async fn app(docs: Vec<(String, Value)>) -> Router {
        let config = Config::from_vars(|key| match key {
            "STORE_BACKEND" => Some("memory".to_string()),
            "DEFAULT_PAGE_SIZE" => Some("2".to_string()),
            _ => None,
        })
        .unwrap();
        let service = PolicyService::new(
            seeded_store(docs).await,
            Arc::new(LogNotifier),
            config.page_limits(),
            Duration::from_secs(5),
        );
        build_router(AppState { service, config })
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let (status, body) = send(app, Request::get(uri).body(Body::empty()).unwrap()).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, body) = send(app, request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    fn three_policies() -> Vec<(String, Value)> {
        vec![
            ("a".to_string(), policy_doc("Pajak Karbon", "Kemenkeu", "2024-01-01")),
            ("b".to_string(), policy_doc("Subsidi Energi", "ESDM", "2024-01-02")),
            ("c".to_string(), policy_doc("RUU Polri", "DPR", "2024-01-03")),
        ]
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(&app(vec![]).await, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "policy-registry");
        assert_eq!(body["store"], "memory");
    }

    #[tokio::test]
    async fn test_list_follows_cursor() {
        let app = app(three_policies()).await;

        let (status, first) = get_json(&app, "/api/v1/policies").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["records"].as_array().unwrap().len(), 2);
        assert_eq!(first["records"][0]["id"], "c");
        let cursor = first["nextCursor"].as_str().unwrap();

        let (_, second) = get_json(&app, &format!("/api/v1/policies?cursor={cursor}")).await;
        assert_eq!(second["records"][0]["id"], "a");
        assert!(second["nextCursor"].is_null());
    }

    #[tokio::test]
    async fn test_list_with_filters() {
        let app = app(three_policies()).await;
        let (status, body) =
            get_json(&app, "/api/v1/policies?agency=ESDM&year=2024&searchQuery=energi").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["records"][0]["id"], "b");
        assert_eq!(body["records"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_cursor_is_400() {
        let (status, body) = get_json(&app(vec![]).await, "/api/v1/policies?cursor=nope").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_CURSOR");
    }

    #[tokio::test]
    async fn test_unknown_policy_is_404() {
        let (status, body) = get_json(&app(vec![]).await, "/api/v1/policies/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_malformed_policy_is_422() {
        let app = app(vec![("bad".to_string(), json!({"agency": "A"}))]).await;
        let (status, _) = get_json(&app, "/api/v1/policies/bad").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_submit_then_verify() {
        let app = app(vec![]).await;

        let (status, body) = post_json(
            &app,
            "/api/v1/policies",
            json!({"title": "X", "agency": "Y", "documentUrl": "https://a", "impactSummary": "z"}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["id"].as_str().unwrap().to_string();

        let (status, pending) = get_json(&app, "/api/v1/policies/pending").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending["records"][0]["id"], id.as_str());

        let (status, _) = post_json(
            &app,
            &format!("/api/v1/policies/{id}/verify"),
            json!({"verifiedBy": "admin1"}),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, record) = get_json(&app, &format!("/api/v1/policies/{id}")).await;
        assert_eq!(record["status"], "ACTIVE");
        assert_eq!(record["verificationDetails"]["verifiedBy"], "admin1");
        assert_eq!(record["verificationDetails"]["method"], "manual");
    }

    #[tokio::test]
    async fn test_submit_validation_is_400() {
        let (status, body) = post_json(
            &app(vec![]).await,
            "/api/v1/policies",
            json!({"title": "X"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_topics_and_archive() {
        let app = app(three_policies()).await;

        let (status, record) = post_json(
            &app,
            "/api/v1/policies/a/topics",
            json!({"topics": "iklim, pajak"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["topics"], json!(["iklim", "pajak"]));

        let (status, _) = post_json(&app, "/api/v1/policies/a/archive", json!({})).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, record) = get_json(&app, "/api/v1/policies/a").await;
        assert_eq!(record["status"], "ARCHIVED");
    }

    #[tokio::test]
    async fn test_media_coverage_append() {
        let app = app(three_policies()).await;
        let (status, record) = post_json(
            &app,
            "/api/v1/policies/b/media-coverage",
            json!({"title": "Liputan", "url": "https://tempo.co/x", "type": "national"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["mediaCoverage"][0]["type"], "national");
    }

    #[tokio::test]
    async fn test_export_csv_attachment() {
        let app = app(three_policies()).await;
        let response = app
            .clone()
            .oneshot(
                Request::get("/api/v1/policies/export?locale=en")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );
        assert!(response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment; filename=\"kebijakan_"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let csv = String::from_utf8(body.to_vec()).unwrap();
        // export walks past the default page size
        assert_eq!(csv.lines().count(), 4);
        assert!(csv.starts_with("Title,Agency,"));
    }

    #[tokio::test]
    async fn test_statistics() {
        let (status, body) = get_json(&app(three_policies()).await, "/api/v1/policies/statistics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalPolicies"], 3);
        assert_eq!(body["recentPolicies"].as_array().unwrap().len(), 7);
    }
}
