//! Sentence embeddings with a Candle BERT encoder

use super::download::ModelDownloader;
use super::{Embedder, EmbeddingRuntime, ProgressCallback};
use anyhow::{Context, Result};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use std::path::PathBuf;
use std::sync::Arc;
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};
use tracing::{debug, info};

pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

const MAX_SEQUENCE_TOKENS: usize = 256;

/// Loads [`CandleEmbedder`]s from HuggingFace repos with safetensors weights
pub struct CandleEmbeddingRuntime {
    cache_dir: Option<PathBuf>,
}

impl CandleEmbeddingRuntime {
    pub fn new() -> Self {
        Self { cache_dir: None }
    }

    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: Some(cache_dir.into()),
        }
    }
}

impl Default for CandleEmbeddingRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingRuntime for CandleEmbeddingRuntime {
    async fn load(&self, model_ref: &str) -> Result<Arc<dyn Embedder>> {
        let downloader = match &self.cache_dir {
            Some(dir) => ModelDownloader::with_cache_dir(dir.clone())?,
            None => ModelDownloader::new()?,
        };
        let model_ref = model_ref.to_string();

        let embedder = tokio::task::spawn_blocking(move || CandleEmbedder::load(&downloader, &model_ref))
            .await
            .context("Embedding model load task panicked")??;

        Ok(Arc::new(embedder))
    }
}

/// Encoder state shared with blocking embed tasks
struct BertEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

pub struct CandleEmbedder {
    encoder: Arc<BertEncoder>,
    dimension: usize,
}

impl CandleEmbedder {
    /// Blocking; downloads on first use
    pub fn load(downloader: &ModelDownloader, repo_id: &str) -> Result<Self> {
        info!("Loading embedding model {}", repo_id);
        let quiet: ProgressCallback = Arc::new(|_| {});

        let config_path = downloader.fetch(repo_id, "config.json", &quiet)?;
        let weights_path = downloader.fetch(repo_id, "model.safetensors", &quiet)?;
        let tokenizer_path = downloader.fetch_tokenizer(repo_id, &quiet)?;

        let config: BertConfig = serde_json::from_str(
            &std::fs::read_to_string(&config_path).context("Failed to read embedding config")?,
        )
        .context("Failed to parse embedding config")?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer.with_padding(Some(PaddingParams::default()));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to configure truncation: {}", e))?;

        let device = Device::Cpu;
        // Safety: the file is owned by the hf-hub cache and not modified while mapped
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)? };
        let model = BertModel::load(vb, &config).context("Failed to build BERT model")?;

        debug!("Embedding model ready, dimension {}", config.hidden_size);
        Ok(Self {
            encoder: Arc::new(BertEncoder {
                model,
                tokenizer,
                device,
            }),
            dimension: config.hidden_size,
        })
    }
}

impl BertEncoder {
    fn embed_blocking(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = input_ids.zeros_like()?;
        let attention_mask = Tensor::new(encoding.get_attention_mask(), &self.device)?.unsqueeze(0)?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        let pooled = mean_pool(&hidden, &attention_mask)?;
        let normalized = l2_normalize(&pooled)?;
        Ok(normalized.squeeze(0)?.to_vec1::<f32>()?)
    }
}

/// Mean over the sequence, ignoring padded positions
///
/// `hidden`: [batch, seq, dim], `mask`: [batch, seq] → [batch, dim]
fn mean_pool(hidden: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = mask.to_dtype(DType::F32)?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9, f64::INFINITY)?;
    summed.broadcast_div(&counts)
}

fn l2_normalize(v: &Tensor) -> candle_core::Result<Tensor> {
    let norm = v.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(1e-12, f64::INFINITY)?;
    v.broadcast_div(&norm)
}

#[async_trait]
impl Embedder for CandleEmbedder {
    /// The forward pass runs on the blocking pool
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let encoder = self.encoder.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || encoder.embed_blocking(&text))
            .await
            .context("Embedding task panicked")?
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
