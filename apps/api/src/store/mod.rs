//! Document store seam.
//!
//! The policy layer talks to storage only through [`DocumentStore`], carried
//! as `Arc<dyn DocumentStore>` and injected at startup. Two backends:
//! `PgDocumentStore` (JSONB rows in PostgreSQL) and `MemoryStore`
//! (development, seeding, tests).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::policy::cursor::SortKey;
use crate::policy::query::QueryPlan;

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("document encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// One raw stored document. `created_at` is the store's sort instant, derived
/// from the document's `createdAt` when it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub data: Value,
}

impl StoredDocument {
    pub fn sort_key(&self) -> SortKey {
        SortKey {
            created_at: self.created_at,
            id: self.id.clone(),
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Runs a plan: predicates, creation-descending order, resume-after key,
    /// at most `plan.fetch_limit` documents.
    async fn query(&self, plan: &QueryPlan) -> Result<Vec<StoredDocument>, StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, StoreError>;

    /// Merges `fields` into the document's top level as one atomic write.
    /// Fails with [`StoreError::NotFound`] when the document does not exist.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Stores a new document under a freshly generated id and returns it.
    async fn add(&self, collection: &str, fields: Map<String, Value>) -> Result<String, StoreError>;

    /// Every document of a collection, in creation-descending order.
    async fn scan(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError>;
}
