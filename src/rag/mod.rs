//! Retrieval-augmented generation building blocks
//!
//! Three retrieval tiers share these pieces and the [`RagResponse`] shape:
//! cloud-indexed retrieval, fully local retrieval over caller documents, and
//! offline retrieval over a synced index. The tiers themselves live on
//! [`crate::sdk::EdgeSdk`].

mod chunker;
mod context;
mod offline;
mod similarity;

pub use chunker::{chunk_text, ChunkParams, TextChunk, MIN_CHUNK_CHARS};
pub use context::{
    apply_template, assemble_context, build_prompt, context_budget_chars, estimate_tokens,
    truncate_context, CHARS_PER_TOKEN, PROMPT_RESERVE_TOKENS,
};
pub use offline::{OfflineChunk, OfflineIndex, OfflineIndexMetadata, OfflineStore};
pub use similarity::{cosine_similarity, rank_by_similarity};

use crate::api::types::RemoteChunk;
use serde::{Deserialize, Serialize, Serializer};

pub const DEFAULT_TOP_K: usize = 3;

/// Which retrieval strategy produced a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum RagTier {
    Local = 1,
    Cloud = 2,
    Offline = 3,
}

impl RagTier {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for RagTier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RagTier::Local),
            2 => Ok(RagTier::Cloud),
            3 => Ok(RagTier::Offline),
            other => Err(format!("unknown RAG tier {}", other)),
        }
    }
}

impl Serialize for RagTier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagChunk {
    pub id: String,
    pub document_id: Option<String>,
    /// Document name or other human-readable origin
    pub source: String,
    pub content: String,
    pub similarity: f32,
    pub metadata: serde_json::Value,
}

impl From<RemoteChunk> for RagChunk {
    fn from(chunk: RemoteChunk) -> Self {
        Self {
            source: chunk
                .document_name
                .clone()
                .or_else(|| chunk.document_id.clone())
                .unwrap_or_default(),
            id: chunk.id,
            document_id: chunk.document_id,
            content: chunk.content,
            similarity: chunk.similarity,
            metadata: chunk.metadata,
        }
    }
}

impl From<(&OfflineChunk, f32)> for RagChunk {
    fn from((chunk, similarity): (&OfflineChunk, f32)) -> Self {
        Self {
            id: chunk.id.clone(),
            document_id: chunk.document_id.clone(),
            source: chunk
                .document_name
                .clone()
                .or_else(|| chunk.document_id.clone())
                .unwrap_or_default(),
            content: chunk.content.clone(),
            similarity,
            metadata: chunk.metadata.clone(),
        }
    }
}

/// Caller-supplied document for local retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub content: String,
}

impl Document {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            content: content.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagResponse {
    pub query: String,
    pub chunks: Vec<RagChunk>,
    pub answer: String,
    pub context: String,
    pub latency_ms: u64,
    pub tier: RagTier,
}
