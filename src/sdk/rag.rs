//! The three retrieval tiers on [`EdgeSdk`]

use super::EdgeSdk;
use crate::error::SdkError;
use crate::progress::{EventKind, SdkEvent};
use crate::rag::{
    apply_template, assemble_context, build_prompt, chunk_text, rank_by_similarity,
    truncate_context, ChunkParams, Document, OfflineIndex, OfflineIndexMetadata, RagChunk,
    RagResponse, RagTier, DEFAULT_TOP_K,
};
use crate::registry::{LoadOptions, LoadedModel};
use crate::runtime::{Embedder, GenerateOptions};
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct RagOptions {
    pub top_k: usize,
    /// Falls back to the configured default model
    pub model_id: Option<String>,
    pub generate: GenerateOptions,
}

impl Default for RagOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            model_id: None,
            generate: GenerateOptions::default(),
        }
    }
}

impl RagOptions {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_generate(mut self, options: GenerateOptions) -> Self {
        self.generate = options;
        self
    }
}

impl EdgeSdk {
    fn rag_model<'a>(&'a self, options: &'a RagOptions) -> &'a str {
        options
            .model_id
            .as_deref()
            .unwrap_or(&self.config.default_model)
    }

    fn require_session(&self) -> Result<String, SdkError> {
        self.device_id().ok_or(SdkError::NotInitialized)
    }

    /// Tier 2: server-side retrieval, local generation
    pub async fn rag_query(
        &self,
        kb_id: &str,
        query: &str,
        options: &RagOptions,
    ) -> Result<RagResponse, SdkError> {
        let result = self.rag_query_inner(kb_id, query, options).await;
        self.mirror(result)
    }

    async fn rag_query_inner(
        &self,
        kb_id: &str,
        query: &str,
        options: &RagOptions,
    ) -> Result<RagResponse, SdkError> {
        let start = Instant::now();
        self.require_session()?;

        let model_id = self.rag_model(options);
        let loaded = self.ensure_loaded(model_id, &LoadOptions::default()).await?;

        let remote = self
            .api
            .rag_query(kb_id, query, options.top_k, model_id)
            .await?;
        let chunks: Vec<RagChunk> = remote.retrieved_chunks.into_iter().map(RagChunk::from).collect();

        let context = if remote.context.is_empty() {
            assemble_context(&chunks, loaded.context_window)
        } else {
            truncate_context(&remote.context, loaded.context_window)
        };
        debug!(kb_id, chunks = chunks.len(), context_chars = context.chars().count(), "Cloud retrieval complete");

        let prompt = match remote.prompt_template.as_deref() {
            Some(template) if !template.is_empty() => apply_template(template, &context, query),
            _ => build_prompt(&context, query),
        };

        self.answer(&loaded, query, prompt, chunks, context, start, RagTier::Cloud, options)
            .await
    }

    /// Tier 1: chunk, embed and rank caller documents without any network
    pub async fn rag_query_local(
        &self,
        query: &str,
        documents: &[Document],
        options: &RagOptions,
    ) -> Result<RagResponse, SdkError> {
        let result = self.rag_query_local_inner(query, documents, options).await;
        self.mirror(result)
    }

    async fn rag_query_local_inner(
        &self,
        query: &str,
        documents: &[Document],
        options: &RagOptions,
    ) -> Result<RagResponse, SdkError> {
        let start = Instant::now();

        let loaded = self
            .ensure_loaded(self.rag_model(options), &LoadOptions::default())
            .await?;
        let params = ChunkParams::for_context_window(loaded.context_window);
        let embedder = self.embedder().await?;

        let mut candidates = Vec::new();
        let mut embeddings = Vec::new();
        for document in documents {
            for (i, piece) in chunk_text(&document.content, params).into_iter().enumerate() {
                embeddings.push(embed(embedder.as_ref(), &piece.content).await?);
                candidates.push(RagChunk {
                    id: format!("{}-{}", document.id, i),
                    document_id: Some(document.id.clone()),
                    source: document.name.clone(),
                    content: piece.content,
                    similarity: 0.0,
                    metadata: serde_json::json!({ "start": piece.start, "end": piece.end }),
                });
            }
        }
        debug!(
            documents = documents.len(),
            chunks = candidates.len(),
            chunk_size = params.size,
            "Local documents chunked"
        );

        let query_embedding = embed(embedder.as_ref(), query).await?;
        let chunks: Vec<RagChunk> =
            rank_by_similarity(&query_embedding, embeddings.iter().map(Vec::as_slice), options.top_k)
                .into_iter()
                .map(|(i, similarity)| RagChunk {
                    similarity,
                    ..candidates[i].clone()
                })
                .collect();

        let context = assemble_context(&chunks, loaded.context_window);
        let prompt = build_prompt(&context, query);

        self.answer(&loaded, query, prompt, chunks, context, start, RagTier::Local, options)
            .await
    }

    /// Tier 3 setup: downloads a knowledge base for offline queries
    ///
    /// Chunks shipped without an embedding, or with one of a different
    /// dimension than the local embedding model, are embedded here so queries
    /// never need the network.
    pub async fn sync_knowledge_base(&self, kb_id: &str) -> Result<OfflineIndexMetadata, SdkError> {
        let result = self.sync_knowledge_base_inner(kb_id).await;
        self.mirror(result)
    }

    async fn sync_knowledge_base_inner(&self, kb_id: &str) -> Result<OfflineIndexMetadata, SdkError> {
        let device_id = self.require_session()?;

        let response = self.api.rag_sync(kb_id, &device_id).await?;
        let package_size_mb = response.package_size_mb;
        let mut index = OfflineIndex::from_sync(kb_id, response, Utc::now());

        let embedder = self.embedder().await?;
        let dimension = embedder.dimension();
        let missing = index.chunks_needing_embedding(dimension);
        for &i in &missing {
            let embedding = embed(embedder.as_ref(), &index.chunks[i].content).await?;
            index.chunks[i].embedding = Some(embedding);
        }
        index.metadata.embedding_dimension = dimension;

        let metadata = index.metadata.clone();
        self.offline.insert(kb_id, index);

        info!(
            kb_id,
            chunks = metadata.total_chunks,
            embedded_locally = missing.len(),
            expires_at = %metadata.expires_at,
            "Knowledge base synced"
        );
        self.handler.on_event(&SdkEvent::new(
            EventKind::KbSynced,
            serde_json::json!({
                "kb_id": kb_id,
                "chunk_count": metadata.total_chunks,
                "package_size_mb": package_size_mb,
                "expires_at": metadata.expires_at,
            }),
        ));

        Ok(metadata)
    }

    /// Tier 3: ranks a synced index locally
    pub async fn rag_query_offline(
        &self,
        kb_id: &str,
        query: &str,
        options: &RagOptions,
    ) -> Result<RagResponse, SdkError> {
        let result = self.rag_query_offline_inner(kb_id, query, options).await;
        self.mirror(result)
    }

    async fn rag_query_offline_inner(
        &self,
        kb_id: &str,
        query: &str,
        options: &RagOptions,
    ) -> Result<RagResponse, SdkError> {
        let start = Instant::now();

        let index = self
            .offline
            .get(kb_id)
            .ok_or_else(|| SdkError::NotSynced(kb_id.to_string()))?;
        index.ensure_valid(Utc::now())?;

        let loaded = self
            .ensure_loaded(self.rag_model(options), &LoadOptions::default())
            .await?;
        let embedder = self.embedder().await?;
        let query_embedding = embed(embedder.as_ref(), query).await?;

        let empty: &[f32] = &[];
        let ranked = rank_by_similarity(
            &query_embedding,
            index
                .chunks
                .iter()
                .map(|c| c.embedding.as_deref().unwrap_or(empty)),
            options.top_k,
        );
        let chunks: Vec<RagChunk> = ranked
            .into_iter()
            .map(|(i, similarity)| RagChunk::from((&index.chunks[i], similarity)))
            .collect();

        let context = assemble_context(&chunks, loaded.context_window);
        let prompt = build_prompt(&context, query);

        self.answer(&loaded, query, prompt, chunks, context, start, RagTier::Offline, options)
            .await
    }

    /// Metadata of a synced index, expired or not
    pub fn offline_index(&self, kb_id: &str) -> Option<OfflineIndexMetadata> {
        self.offline.get(kb_id).map(|index| index.metadata.clone())
    }

    pub fn offline_knowledge_bases(&self) -> Vec<String> {
        self.offline.ids()
    }

    pub fn remove_offline_index(&self, kb_id: &str) -> bool {
        self.offline.remove(kb_id).is_some()
    }

    #[allow(clippy::too_many_arguments)]
    async fn answer(
        &self,
        loaded: &LoadedModel,
        query: &str,
        prompt: String,
        chunks: Vec<RagChunk>,
        context: String,
        start: Instant,
        tier: RagTier,
        options: &RagOptions,
    ) -> Result<RagResponse, SdkError> {
        let generated = self.run_generation(loaded, &prompt, &options.generate).await?;

        Ok(RagResponse {
            query: query.to_string(),
            chunks,
            answer: generated.text,
            context,
            latency_ms: start.elapsed().as_millis() as u64,
            tier,
        })
    }
}

async fn embed(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, SdkError> {
    embedder
        .embed(text)
        .await
        .map_err(|e| SdkError::Embedding(format!("{:#}", e)))
}
