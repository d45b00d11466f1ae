use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};
use uuid::Uuid;

use crate::policy::query::{Predicate, QueryPlan, SortOrder};
use crate::policy::timestamp::sort_instant;
use crate::store::{DocumentStore, StoreError, StoredDocument};

/// Documents as JSONB rows in one `documents` table (see `db::ensure_schema`).
/// `created_at` is extracted from the body at insert time and backs ordering
/// and cursors; `id` uses the C collation so ordering matches byte order.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: String,
    created_at: DateTime<Utc>,
    data: Value,
}

impl From<DocumentRow> for StoredDocument {
    fn from(row: DocumentRow) -> Self {
        StoredDocument {
            id: row.id,
            created_at: row.created_at,
            data: row.data,
        }
    }
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// SQL rendition of `normalizer::effective_status`: legacy `inactive` is a
/// draft, other spellings compare upper-cased and trimmed, and a missing status
/// falls back to the verification marker.
const EFFECTIVE_STATUS_SQL: &str = "(CASE WHEN data ->> 'status' = 'inactive' THEN 'DRAFT' \
     ELSE upper(btrim(COALESCE(data ->> 'status', \
     CASE WHEN data ->> 'verificationStatus' = 'verified' \
     OR data -> 'isVerified' = 'true'::jsonb THEN 'ACTIVE' ELSE 'DRAFT' END))) END)";

/// Appends the WHERE/ORDER/LIMIT tail of a plan to a SELECT over `documents`.
fn push_plan(qb: &mut QueryBuilder<'_, Postgres>, plan: &QueryPlan) {
    qb.push(" WHERE collection = ");
    qb.push_bind(plan.collection.clone());

    for predicate in &plan.predicates {
        match predicate {
            Predicate::Equals { field, value } => {
                qb.push(" AND data -> ");
                qb.push_bind(field.clone());
                qb.push(" = ");
                qb.push_bind(Json(value.clone()));
            }
            Predicate::StatusIs(filter) => {
                qb.push(" AND ");
                qb.push(EFFECTIVE_STATUS_SQL);
                qb.push(" = ");
                qb.push_bind(filter.status().as_str());
            }
            Predicate::CreatedWithin { from, until } => {
                if let Some(from) = from {
                    qb.push(" AND created_at >= ");
                    qb.push_bind(*from);
                }
                if let Some(until) = until {
                    qb.push(" AND created_at < ");
                    qb.push_bind(*until);
                }
            }
        }
    }

    if let Some(after) = &plan.resume_after {
        qb.push(" AND (created_at, id) < (");
        qb.push_bind(after.created_at);
        qb.push(", ");
        qb.push_bind(after.id.clone());
        qb.push(")");
    }

    match plan.order {
        SortOrder::CreatedAtDesc => qb.push(" ORDER BY created_at DESC, id DESC"),
    };

    qb.push(" LIMIT ");
    qb.push_bind(plan.fetch_limit as i64);
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn query(&self, plan: &QueryPlan) -> Result<Vec<StoredDocument>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id, created_at, data FROM documents");
        push_plan(&mut qb, plan);
        debug!(sql = qb.sql(), "running document query");

        let rows = qb
            .build_query_as::<DocumentRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(StoredDocument::from).collect())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        let row: Option<DocumentRow> = sqlx::query_as(
            "SELECT id, created_at, data FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(StoredDocument::from))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        // `||` merges top-level keys inside a single UPDATE statement.
        let result = sqlx::query(
            "UPDATE documents SET data = data || $3 WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .bind(Json(Value::Object(fields)))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn add(&self, collection: &str, fields: Map<String, Value>) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let data = Value::Object(fields);
        let created_at = sort_instant(&data);

        sqlx::query(
            "INSERT INTO documents (collection, id, created_at, data) VALUES ($1, $2, $3, $4)",
        )
        .bind(collection)
        .bind(&id)
        .bind(created_at)
        .bind(Json(&data))
        .execute(&self.pool)
        .await?;

        info!("Inserted document {collection}/{id}");
        Ok(id)
    }

    async fn scan(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            "SELECT id, created_at, data FROM documents WHERE collection = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(StoredDocument::from).collect())
    }
}
