use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::policy::query::QueryPlan;
use crate::policy::timestamp::sort_instant;
use crate::store::{DocumentStore, StoreError, StoredDocument};

/// In-process document store. Collections are maps of id → document behind
/// one `RwLock`, so every single-document update is atomic.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, HashMap<String, StoredDocument>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts (or replaces) a document under a caller-chosen id.
    pub async fn insert(&self, collection: &str, id: &str, data: Value) {
        let doc = StoredDocument {
            id: id.to_string(),
            created_at: sort_instant(&data),
            data,
        };
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc);
    }

    /// Loads a JSON array of documents. An `id` key, when present, becomes the
    /// document id and is removed from the body.
    pub async fn load_seed(&self, collection: &str, path: &Path) -> Result<usize> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        let docs: Vec<Value> = serde_json::from_str(&raw)
            .with_context(|| format!("Seed file {} is not a JSON array", path.display()))?;

        let count = docs.len();
        for mut doc in docs {
            let id = doc
                .as_object_mut()
                .and_then(|map| map.remove("id"))
                .and_then(|id| id.as_str().map(String::from))
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            self.insert(collection, &id, doc).await;
        }

        info!("Seeded {count} documents into '{collection}' from {}", path.display());
        Ok(count)
    }
}

fn sorted_desc(mut docs: Vec<StoredDocument>) -> Vec<StoredDocument> {
    docs.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
    docs
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn query(&self, plan: &QueryPlan) -> Result<Vec<StoredDocument>, StoreError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(&plan.collection) else {
            return Ok(Vec::new());
        };

        let matching: Vec<StoredDocument> = docs
            .values()
            .filter(|doc| {
                plan.predicates
                    .iter()
                    .all(|p| p.matches(doc.created_at, &doc.data))
            })
            .filter(|doc| {
                plan.resume_after
                    .as_ref()
                    .map_or(true, |after| doc.sort_key() < *after)
            })
            .cloned()
            .collect();

        Ok(sorted_desc(matching)
            .into_iter()
            .take(plan.fetch_limit)
            .collect())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        match doc.data.as_object_mut() {
            Some(existing) => existing.extend(fields),
            None => doc.data = Value::Object(fields),
        }
        Ok(())
    }

    async fn add(&self, collection: &str, fields: Map<String, Value>) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.insert(collection, &id, Value::Object(fields)).await;
        Ok(id)
    }

    async fn scan(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        let collections = self.collections.read().await;
        let docs = collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default();
        Ok(sorted_desc(docs))
    }
}
