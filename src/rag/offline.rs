//! Offline knowledge-base indexes pulled once from the server

use crate::api::types::SyncResponse;
use crate::error::SdkError;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfflineIndexMetadata {
    pub kb_id: String,
    pub kb_name: Option<String>,
    pub chunk_size: usize,
    pub embedding_dimension: usize,
    pub total_chunks: usize,
    pub synced_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub sync_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfflineChunk {
    pub id: String,
    pub document_id: Option<String>,
    pub document_name: Option<String>,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct OfflineIndex {
    pub metadata: OfflineIndexMetadata,
    pub chunks: Vec<OfflineChunk>,
}

impl OfflineIndex {
    pub fn from_sync(kb_id: &str, response: SyncResponse, synced_at: DateTime<Utc>) -> Self {
        let package = response.sync_package;
        let chunks: Vec<OfflineChunk> = package
            .chunks
            .into_iter()
            .map(|c| OfflineChunk {
                id: c.id,
                document_id: c.document_id,
                document_name: c.document_name,
                content: c.content,
                embedding: c.embedding.filter(|e| !e.is_empty()),
                metadata: c.metadata,
            })
            .collect();

        let embedding_dimension = match package.metadata.embedding_dimension {
            0 => chunks
                .iter()
                .find_map(|c| c.embedding.as_ref().map(Vec::len))
                .unwrap_or_default(),
            dimension => dimension,
        };

        Self {
            metadata: OfflineIndexMetadata {
                kb_id: package
                    .metadata
                    .knowledge_base_id
                    .unwrap_or_else(|| kb_id.to_string()),
                kb_name: package.metadata.knowledge_base_name,
                chunk_size: package.metadata.chunk_size,
                embedding_dimension,
                total_chunks: chunks.len(),
                synced_at,
                expires_at: response.expires_at,
                sync_token: package.metadata.sync_token,
            },
            chunks,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.metadata.expires_at
    }

    /// Time left before a re-sync is required; `None` once expired
    pub fn remaining_validity(&self, now: DateTime<Utc>) -> Option<Duration> {
        let remaining = self.metadata.expires_at - now;
        (remaining > Duration::zero()).then_some(remaining)
    }

    pub fn ensure_valid(&self, now: DateTime<Utc>) -> Result<(), SdkError> {
        if self.is_expired(now) {
            return Err(SdkError::Expired {
                kb_id: self.metadata.kb_id.clone(),
                expired_at: self.metadata.expires_at.to_rfc3339(),
            });
        }
        Ok(())
    }

    /// Chunks whose embedding is absent or not `dimension` long
    pub fn chunks_needing_embedding(&self, dimension: usize) -> Vec<usize> {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.embedding.as_ref().map_or(true, |e| e.len() != dimension))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Synced indexes keyed by knowledge-base id
#[derive(Debug, Default)]
pub struct OfflineStore {
    indexes: RwLock<HashMap<String, Arc<OfflineIndex>>>,
}

impl OfflineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kb_id: &str, index: OfflineIndex) -> Arc<OfflineIndex> {
        let index = Arc::new(index);
        if let Ok(mut indexes) = self.indexes.write() {
            indexes.insert(kb_id.to_string(), index.clone());
        }
        index
    }

    pub fn get(&self, kb_id: &str) -> Option<Arc<OfflineIndex>> {
        self.indexes.read().ok()?.get(kb_id).cloned()
    }

    pub fn remove(&self, kb_id: &str) -> Option<Arc<OfflineIndex>> {
        self.indexes.write().ok()?.remove(kb_id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .indexes
            .read()
            .map(|i| i.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn clear(&self) {
        if let Ok(mut indexes) = self.indexes.write() {
            indexes.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_response(expires_at: &str) -> SyncResponse {
        serde_json::from_value(serde_json::json!({
            "sync_package": {
                "metadata": { "knowledge_base_name": "Handbook", "chunk_size": 512 },
                "chunks": [
                    { "id": "c1", "content": "alpha", "embedding": [1.0, 0.0] },
                    { "id": "c2", "content": "beta", "embedding": [] },
                    { "id": "c3", "content": "gamma" }
                ]
            },
            "chunk_count": 3,
            "expires_at": expires_at
        }))
        .unwrap()
    }

    fn at(timestamp: &str) -> DateTime<Utc> {
        timestamp.parse().unwrap()
    }

    #[test]
    fn test_from_sync_fills_metadata() {
        let index = OfflineIndex::from_sync(
            "kb-1",
            sync_response("2026-01-02T00:00:00Z"),
            at("2026-01-01T00:00:00Z"),
        );

        assert_eq!(index.metadata.kb_id, "kb-1");
        assert_eq!(index.metadata.kb_name.as_deref(), Some("Handbook"));
        assert_eq!(index.metadata.total_chunks, 3);
        assert_eq!(index.metadata.embedding_dimension, 2);
        assert!(index.chunks[1].embedding.is_none());
        assert_eq!(index.chunks_needing_embedding(2), vec![1, 2]);
        assert_eq!(index.chunks_needing_embedding(384), vec![0, 1, 2]);
    }

    #[test]
    fn test_expiry() {
        let index = OfflineIndex::from_sync(
            "kb-1",
            sync_response("2026-01-02T00:00:00Z"),
            at("2026-01-01T00:00:00Z"),
        );

        let before = at("2026-01-01T12:00:00Z");
        assert!(!index.is_expired(before));
        assert_eq!(index.remaining_validity(before), Some(Duration::hours(12)));
        assert!(index.ensure_valid(before).is_ok());

        let after = at("2026-01-03T00:00:00Z");
        assert!(index.is_expired(after));
        assert!(index.remaining_validity(after).is_none());
        assert!(matches!(
            index.ensure_valid(after),
            Err(SdkError::Expired { .. })
        ));
    }

    #[test]
    fn test_store_roundtrip() {
        let store = OfflineStore::new();
        let index = OfflineIndex::from_sync("kb-1", sync_response("2030-01-01T00:00:00Z"), Utc::now());

        store.insert("kb-1", index);
        assert_eq!(store.ids(), vec!["kb-1"]);
        assert!(store.get("kb-1").is_some());
        assert!(store.remove("kb-1").is_some());
        assert!(store.get("kb-1").is_none());
    }
}
