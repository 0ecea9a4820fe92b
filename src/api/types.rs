//! Wire types for the backend API

use crate::device::DeviceProfile;
use crate::telemetry::TelemetryEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest<'a> {
    pub api_key: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterDeviceRequest<'a> {
    pub device_id: &'a str,
    #[serde(flatten)]
    pub profile: &'a DeviceProfile,
}

#[derive(Debug, Serialize)]
pub struct TelemetryBatchRequest<'a> {
    pub device_id: &'a str,
    pub metrics: &'a [TelemetryEntry],
}

#[derive(Debug, Serialize)]
pub struct RagQueryRequest<'a> {
    pub query: &'a str,
    pub top_k: usize,
    pub model_id: &'a str,
}

/// A chunk as the retrieval endpoint returns it
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteChunk {
    #[serde(alias = "chunk_id")]
    pub id: String,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default, alias = "source")]
    pub document_name: Option<String>,
    pub content: String,
    #[serde(default, alias = "score")]
    pub similarity: f32,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RagQueryResponse {
    #[serde(default)]
    pub retrieved_chunks: Vec<RemoteChunk>,
    /// Contains a `{context}` placeholder, and `{question}` when set
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Serialize)]
pub struct SyncRequest<'a> {
    pub device_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncPackageMetadata {
    #[serde(default)]
    pub knowledge_base_id: Option<String>,
    #[serde(default)]
    pub knowledge_base_name: Option<String>,
    #[serde(default)]
    pub chunk_size: usize,
    #[serde(default)]
    pub embedding_dimension: usize,
    #[serde(default)]
    pub sync_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncChunk {
    pub id: String,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub document_name: Option<String>,
    pub content: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncPackage {
    pub metadata: SyncPackageMetadata,
    #[serde(default)]
    pub chunks: Vec<SyncChunk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncResponse {
    pub sync_package: SyncPackage,
    #[serde(default)]
    pub chunk_count: usize,
    #[serde(default)]
    pub package_size_mb: f64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(alias = "message")]
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_request_uses_camel_case() {
        let body = serde_json::to_value(AuthRequest { api_key: "k" }).unwrap();
        assert_eq!(body, serde_json::json!({ "apiKey": "k" }));
    }

    #[test]
    fn test_rag_response_accepts_score_alias() {
        let response: RagQueryResponse = serde_json::from_value(serde_json::json!({
            "retrieved_chunks": [
                { "id": "c1", "source": "guide.md", "content": "text", "score": 0.8 }
            ],
            "context": "text"
        }))
        .unwrap();

        let chunk = &response.retrieved_chunks[0];
        assert_eq!(chunk.document_name.as_deref(), Some("guide.md"));
        assert!((chunk.similarity - 0.8).abs() < 1e-6);
        assert!(response.prompt_template.is_none());
    }

    #[test]
    fn test_sync_response_parses() {
        let response: SyncResponse = serde_json::from_value(serde_json::json!({
            "sync_package": {
                "metadata": {
                    "knowledge_base_id": "kb1",
                    "knowledge_base_name": "Docs",
                    "chunk_size": 512,
                    "embedding_dimension": 3,
                    "sync_token": "tok"
                },
                "chunks": [
                    { "id": "c1", "content": "hello", "embedding": [0.1, 0.2, 0.3] },
                    { "id": "c2", "content": "world" }
                ]
            },
            "chunk_count": 2,
            "package_size_mb": 0.01,
            "expires_at": "2030-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(response.sync_package.chunks.len(), 2);
        assert!(response.sync_package.chunks[1].embedding.is_none());
        assert_eq!(response.expires_at.timestamp(), 1893456000);
    }
}
