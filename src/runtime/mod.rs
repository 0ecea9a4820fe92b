//! Inference and embedding runtime boundary
//!
//! The SDK never touches tensors directly. It asks an [`InferenceRuntime`] to
//! materialize a [`ModelPipeline`] for a model reference and precision, and an
//! [`EmbeddingRuntime`] for an [`Embedder`]. The Candle-backed implementations
//! are the defaults; any other backend can be plugged in through these traits.

mod candle;
mod download;
mod embedding;
mod mock;

pub use self::candle::CandleRuntime;
pub use download::ModelDownloader;
pub use embedding::{CandleEmbedder, CandleEmbeddingRuntime, DEFAULT_EMBEDDING_MODEL};
pub use mock::{MockEmbedder, MockEmbeddingRuntime, MockPipeline, MockRuntime};

use crate::device::ComputeDevice;
use crate::planner::Precision;
use crate::registry::TaskKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Raw progress reported by a runtime while it fetches and loads weights
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeProgress {
    Initiate { file: String },
    Download {
        file: String,
        loaded: u64,
        total: Option<u64>,
    },
    Progress { file: String, percent: f32 },
    Done { file: String },
    Ready,
}

pub type ProgressCallback = Arc<dyn Fn(RuntimeProgress) + Send + Sync>;

/// What to load and where
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub task: TaskKind,
    /// External reference, e.g. a HuggingFace repo id, optionally `repo:file`
    pub model_ref: String,
    pub tokenizer_ref: Option<String>,
    pub precision: Precision,
    pub device: ComputeDevice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
    /// Greedy decoding when false
    pub do_sample: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
            temperature: 0.7,
            top_p: 0.9,
            do_sample: true,
        }
    }
}

impl GenerateOptions {
    pub fn with_max_new_tokens(mut self, max_new_tokens: usize) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn greedy(mut self) -> Self {
        self.do_sample = false;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscribeOptions {
    pub language: Option<String>,
    pub return_timestamps: bool,
}

#[async_trait]
pub trait InferenceRuntime: Send + Sync {
    async fn load(
        &self,
        request: LoadRequest,
        progress: ProgressCallback,
    ) -> anyhow::Result<Arc<dyn ModelPipeline>>;

    fn name(&self) -> &str;
}

/// A loaded model
#[async_trait]
pub trait ModelPipeline: Send + Sync {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> anyhow::Result<String>;

    async fn transcribe(
        &self,
        _audio: &[f32],
        _options: &TranscribeOptions,
    ) -> anyhow::Result<String> {
        anyhow::bail!("This pipeline does not support speech recognition")
    }

    /// Context length advertised by the weights, when the format carries one
    fn context_length(&self) -> Option<usize> {
        None
    }
}

#[async_trait]
pub trait EmbeddingRuntime: Send + Sync {
    async fn load(&self, model_ref: &str) -> anyhow::Result<Arc<dyn Embedder>>;
}

/// Mean-pooled, L2-normalized sentence embeddings
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    fn dimension(&self) -> usize;
}
