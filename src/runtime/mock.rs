//! Scripted runtimes for tests and offline demos

use super::{
    Embedder, EmbeddingRuntime, GenerateOptions, InferenceRuntime, LoadRequest, ModelPipeline,
    ProgressCallback, RuntimeProgress, TranscribeOptions,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const DEFAULT_RESPONSE: &str = "mock response";

/// Pipeline that replays queued outputs, then repeats a default one
pub struct MockPipeline {
    responses: Mutex<VecDeque<Result<String, String>>>,
    default_response: Option<String>,
    prompts: Mutex<Vec<String>>,
    context_length: Option<usize>,
    transcript: Option<String>,
}

impl MockPipeline {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            default_response: Some(DEFAULT_RESPONSE.to_string()),
            prompts: Mutex::new(Vec::new()),
            context_length: None,
            transcript: None,
        }
    }

    /// Every call fails with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_response: None,
            prompts: Mutex::new(Vec::new()),
            context_length: None,
            transcript: None,
        }
        .with_error(message)
    }

    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()));
        self
    }

    pub fn with_context_length(mut self, context_length: usize) -> Self {
        self.context_length = Some(context_length);
        self
    }

    pub fn with_transcript(mut self, transcript: impl Into<String>) -> Self {
        self.transcript = Some(transcript.into());
        self
    }

    pub fn push(&self, response: Result<String, String>) {
        self.queue().push_back(response);
    }

    pub fn generate_calls(&self) -> usize {
        self.prompts().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts().pop()
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, String>>> {
        self.responses.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ModelPipeline for MockPipeline {
    async fn generate(&self, prompt: &str, _options: &GenerateOptions) -> anyhow::Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let next = self.queue().pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => match &self.default_response {
                Some(text) => Ok(text.clone()),
                None => anyhow::bail!("mock pipeline has no scripted response"),
            },
        }
    }

    async fn transcribe(
        &self,
        audio: &[f32],
        _options: &TranscribeOptions,
    ) -> anyhow::Result<String> {
        match &self.transcript {
            Some(text) => Ok(text.clone()),
            None => anyhow::bail!("mock pipeline cannot transcribe {} samples", audio.len()),
        }
    }

    fn context_length(&self) -> Option<usize> {
        self.context_length
    }
}

/// Runtime that hands out one shared [`MockPipeline`]
pub struct MockRuntime {
    pipeline: Arc<MockPipeline>,
    load_calls: AtomicUsize,
    load_error: Option<String>,
    requests: Mutex<Vec<LoadRequest>>,
}

impl MockRuntime {
    pub fn new(pipeline: MockPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            load_calls: AtomicUsize::new(0),
            load_error: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every `load` fails with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            load_error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn pipeline(&self) -> Arc<MockPipeline> {
        self.pipeline.clone()
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<LoadRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new(MockPipeline::new(Vec::new()))
    }
}

#[async_trait]
impl InferenceRuntime for MockRuntime {
    async fn load(
        &self,
        request: LoadRequest,
        progress: ProgressCallback,
    ) -> anyhow::Result<Arc<dyn ModelPipeline>> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        let file = format!("{}/model.bin", request.model_ref);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        if let Some(message) = &self.load_error {
            anyhow::bail!("{}", message);
        }

        // A realistic burst: repeated and out-of-order byte counts included
        let total = Some(1000);
        progress(RuntimeProgress::Initiate { file: file.clone() });
        for loaded in [0, 250, 250, 200, 500, 1000] {
            progress(RuntimeProgress::Download {
                file: file.clone(),
                loaded,
                total,
            });
        }
        progress(RuntimeProgress::Done { file });
        progress(RuntimeProgress::Ready);

        Ok(self.pipeline.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Deterministic bag-of-words embedder
///
/// Words are hashed into a fixed number of buckets and the counts are
/// L2-normalized, so texts sharing vocabulary score high under cosine.
pub struct MockEmbedder {
    dimension: usize,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub const DEFAULT_DIMENSION: usize = 64;

    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn embed_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = fnv1a(&word.to_lowercase()) as usize % self.dimension;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSION)
    }
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf29ce484222325u64, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Hands out one shared [`MockEmbedder`] and counts loads
#[derive(Default)]
pub struct MockEmbeddingRuntime {
    embedder: Arc<MockEmbedder>,
    load_calls: AtomicUsize,
}

impl MockEmbeddingRuntime {
    pub fn new(embedder: MockEmbedder) -> Self {
        Self {
            embedder: Arc::new(embedder),
            load_calls: AtomicUsize::new(0),
        }
    }

    pub fn embedder(&self) -> Arc<MockEmbedder> {
        self.embedder.clone()
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingRuntime for MockEmbeddingRuntime {
    async fn load(&self, _model_ref: &str) -> anyhow::Result<Arc<dyn Embedder>> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.embedder.clone())
    }
}
