//! Opaque pagination cursors.
//!
//! A cursor carries the sort key (creation instant, document id) of the last
//! store document of a page. It is handed to clients as URL-safe base64 so the
//! store's own cursor type never leaks past the adapter.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::policy::error::PolicyError;

/// Position of a document in the single supported ordering. Descending
/// traversal means "resume after" selects strictly smaller keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
    pub created_at: DateTime<Utc>,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    key: SortKey,
}

#[derive(Serialize, Deserialize)]
struct CursorPayload {
    #[serde(rename = "c")]
    created_at: DateTime<Utc>,
    #[serde(rename = "i")]
    id: String,
}

impl PageCursor {
    pub fn after(key: SortKey) -> Self {
        Self { key }
    }

    pub fn sort_key(&self) -> &SortKey {
        &self.key
    }

    pub fn encode(&self) -> String {
        let payload = CursorPayload {
            created_at: self.key.created_at,
            id: self.key.id.clone(),
        };
        // A two-field struct of a timestamp and a string always serializes.
        let json = serde_json::to_vec(&payload).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Result<Self, PolicyError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| PolicyError::InvalidCursor("cursor is not valid base64".to_string()))?;
        let payload: CursorPayload = serde_json::from_slice(&bytes)
            .map_err(|e| PolicyError::InvalidCursor(format!("cursor sort key unreadable: {e}")))?;
        if payload.id.trim().is_empty() {
            return Err(PolicyError::InvalidCursor(
                "cursor carries no document id".to_string(),
            ));
        }
        Ok(Self {
            key: SortKey {
                created_at: payload.created_at,
                id: payload.id,
            },
        })
    }
}

impl Serialize for PageCursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for PageCursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        PageCursor::decode(&token).map_err(de::Error::custom)
    }
}
