//! The SDK entry point
//!
//! [`EdgeSdk`] ties the pieces together: it authenticates, profiles the
//! device, loads models through the registry, runs generation and
//! transcription, feeds the telemetry batcher and exposes the three RAG tiers
//! (see [`rag`]). Every error returned from a public operation is also mirrored
//! to the [`EventHandler`] as an `error` progress update and an `error` event
//! tagged with its [`ErrorStage`](crate::error::ErrorStage).

mod rag;

pub use rag::RagOptions;

use crate::api::ApiClient;
use crate::config::SdkConfig;
use crate::device::{
    ComputeDevice, DeviceIdentity, DeviceProfile, DeviceProfiler, FileIdentityStore, HardwareCapabilities,
    IdentityStore, MemoryIdentityStore,
};
use crate::error::SdkError;
use crate::planner::Precision;
use crate::progress::{EventHandler, EventKind, LoggingHandler, ProgressStage, ProgressUpdate, SdkEvent};
use crate::rag::OfflineStore;
use crate::registry::{can_run_model, Feasibility, LoadOptions, LoadedModel, ModelLoader};
use crate::runtime::{
    CandleEmbeddingRuntime, CandleRuntime, Embedder, EmbeddingRuntime, GenerateOptions,
    InferenceRuntime, TranscribeOptions, DEFAULT_EMBEDDING_MODEL,
};
use crate::telemetry::{TelemetryBatcher, TelemetryEntry, TelemetryTransport, FLUSH_INTERVAL};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Completion tokens are estimated, not counted
pub const CHARS_PER_COMPLETION_TOKEN: usize = 4;

pub fn estimate_completion_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_COMPLETION_TOKEN)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResult {
    pub text: String,
    pub model_id: String,
    pub latency_ms: u64,
    pub tokens_estimated: usize,
}

pub struct EdgeSdkBuilder {
    config: SdkConfig,
    runtime: Option<Arc<dyn InferenceRuntime>>,
    embedding_runtime: Option<Arc<dyn EmbeddingRuntime>>,
    embedding_model: String,
    identity_store: Option<Arc<dyn IdentityStore>>,
    handler: Arc<dyn EventHandler>,
    telemetry_transport: Option<Arc<dyn TelemetryTransport>>,
    flush_interval: Duration,
    hardware: Option<HardwareCapabilities>,
}

impl EdgeSdkBuilder {
    pub fn new(config: SdkConfig) -> Self {
        Self {
            config,
            runtime: None,
            embedding_runtime: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            identity_store: None,
            handler: Arc::new(LoggingHandler),
            telemetry_transport: None,
            flush_interval: FLUSH_INTERVAL,
            hardware: None,
        }
    }

    pub fn runtime(mut self, runtime: Arc<dyn InferenceRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn embedding_runtime(mut self, runtime: Arc<dyn EmbeddingRuntime>) -> Self {
        self.embedding_runtime = Some(runtime);
        self
    }

    pub fn embedding_model(mut self, model_ref: impl Into<String>) -> Self {
        self.embedding_model = model_ref.into();
        self
    }

    pub fn identity_store(mut self, store: Arc<dyn IdentityStore>) -> Self {
        self.identity_store = Some(store);
        self
    }

    pub fn handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Replaces the backend as telemetry sink
    pub fn telemetry_transport(mut self, transport: Arc<dyn TelemetryTransport>) -> Self {
        self.telemetry_transport = Some(transport);
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Skips OS detection and profiles these capabilities instead
    pub fn hardware(mut self, capabilities: HardwareCapabilities) -> Self {
        self.hardware = Some(capabilities);
        self
    }

    pub fn build(self) -> Result<EdgeSdk, SdkError> {
        self.config.validate()?;

        let api = Arc::new(ApiClient::new(&self.config)?);
        let transport = self
            .telemetry_transport
            .unwrap_or_else(|| api.clone() as Arc<dyn TelemetryTransport>);
        let telemetry = TelemetryBatcher::with_options(
            transport,
            self.handler.clone(),
            self.flush_interval,
            self.config.telemetry_enabled,
        );

        let identity_store = self
            .identity_store
            .unwrap_or_else(|| Arc::new(FileIdentityStore::new(self.config.data_dir.clone())));
        let runtime = self.runtime.unwrap_or_else(|| Arc::new(CandleRuntime::new()));
        let embedding_runtime = self
            .embedding_runtime
            .unwrap_or_else(|| Arc::new(CandleEmbeddingRuntime::new()));

        Ok(EdgeSdk {
            config: self.config,
            api,
            loader: ModelLoader::new(runtime),
            embedding_runtime,
            embedding_model: self.embedding_model,
            embedder: OnceCell::new(),
            identity_store,
            handler: self.handler,
            telemetry,
            offline: OfflineStore::new(),
            hardware: self.hardware,
            profile: Arc::new(RwLock::new(None)),
            compute_device: RwLock::new(ComputeDevice::Cpu),
            device_id: RwLock::new(None),
        })
    }
}

pub struct EdgeSdk {
    config: SdkConfig,
    api: Arc<ApiClient>,
    loader: ModelLoader,
    embedding_runtime: Arc<dyn EmbeddingRuntime>,
    embedding_model: String,
    embedder: OnceCell<Arc<dyn Embedder>>,
    identity_store: Arc<dyn IdentityStore>,
    handler: Arc<dyn EventHandler>,
    telemetry: TelemetryBatcher,
    offline: OfflineStore,
    hardware: Option<HardwareCapabilities>,
    profile: Arc<RwLock<Option<DeviceProfile>>>,
    compute_device: RwLock<ComputeDevice>,
    /// Set once `initialize` has authenticated
    device_id: RwLock<Option<String>>,
}

impl EdgeSdk {
    pub fn builder(config: SdkConfig) -> EdgeSdkBuilder {
        EdgeSdkBuilder::new(config)
    }

    /// Candle runtimes, file identity store, logging handler
    pub fn new(config: SdkConfig) -> Result<Self, SdkError> {
        EdgeSdkBuilder::new(config).build()
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn handler(&self) -> &Arc<dyn EventHandler> {
        &self.handler
    }

    pub fn telemetry(&self) -> &TelemetryBatcher {
        &self.telemetry
    }

    pub fn is_initialized(&self) -> bool {
        self.device_id().is_some()
    }

    pub fn device_id(&self) -> Option<String> {
        self.device_id.read().ok().and_then(|id| id.clone())
    }

    pub fn device_profile(&self) -> Option<DeviceProfile> {
        self.profile.read().ok().and_then(|p| p.clone())
    }

    pub fn loaded_models(&self) -> Vec<String> {
        self.loader.loaded_ids()
    }

    /// Mirrors `err` to the handler, then hands it back
    pub(crate) fn report_error(&self, err: SdkError) -> SdkError {
        let stage = err.stage();
        warn!(stage = stage.as_str(), error = %err, "Operation failed");
        self.handler
            .on_progress(&ProgressUpdate::new(ProgressStage::Error, 0.0, err.to_string()));
        self.handler.on_event(&SdkEvent::new(
            EventKind::Error,
            serde_json::json!({ "stage": stage, "message": err.to_string() }),
        ));
        err
    }

    pub(crate) fn mirror<T>(&self, result: Result<T, SdkError>) -> Result<T, SdkError> {
        result.map_err(|e| self.report_error(e))
    }

    /// Authenticates, profiles the device and registers it
    ///
    /// Authentication failures are returned. Registration and the latency
    /// probe run detached and only surface as events.
    pub async fn initialize(&self) -> Result<DeviceProfile, SdkError> {
        let result = self.initialize_inner().await;
        self.mirror(result)
    }

    async fn initialize_inner(&self) -> Result<DeviceProfile, SdkError> {
        self.config.require_api_key()?;
        self.api.authenticate().await?;

        let identity = DeviceIdentity::load_or_create(self.identity_store.as_ref())
            .or_else(|e| {
                warn!("Device id store unavailable, using an ephemeral id: {:#}", e);
                DeviceIdentity::load_or_create(&MemoryIdentityStore::new())
            })
            .map_err(|e| SdkError::Io(std::io::Error::other(e.to_string())))?;

        let profile = self.analyze_device().await;

        if let Ok(mut device_id) = self.device_id.write() {
            *device_id = Some(identity.device_id.clone());
        }
        self.telemetry.set_device(identity.device_id.clone());
        self.spawn_registration(identity.device_id.clone());

        info!(device_id = %identity.device_id, "SDK initialized");
        Ok(profile)
    }

    /// Probes latency, then registers the refreshed profile. Never fails the caller.
    fn spawn_registration(&self, device_id: String) {
        let api = self.api.clone();
        let profile_slot = self.profile.clone();
        let handler = self.handler.clone();

        tokio::spawn(async move {
            let latency = match api.probe_latency().await {
                Ok(ms) => Some(ms),
                Err(e) => {
                    debug!("Latency probe failed: {}", e);
                    None
                }
            };

            let profile = {
                let Ok(mut slot) = profile_slot.write() else {
                    return;
                };
                let Some(profile) = slot.as_mut() else {
                    return;
                };
                if latency.is_some() {
                    profile.latency_ms = latency;
                }
                profile.clone()
            };

            match api.register_device(&device_id, &profile).await {
                Ok(()) => handler.on_event(&SdkEvent::new(
                    EventKind::DeviceRegistered,
                    serde_json::json!({ "device_id": device_id, "latency_ms": latency }),
                )),
                Err(e) => handler.on_event(&SdkEvent::new(
                    EventKind::RegistrationFailed,
                    serde_json::json!({ "device_id": device_id, "error": e.to_string() }),
                )),
            }
        });
    }

    /// Profiles the device and keeps the result; needs no network
    pub async fn analyze_device(&self) -> DeviceProfile {
        let capabilities = match &self.hardware {
            Some(caps) => caps.clone(),
            None => DeviceProfiler::detect().await,
        };
        let profile = DeviceProfiler::analyze_with(
            self.handler.as_ref(),
            &capabilities,
            &self.config.default_model,
        );

        if let Ok(mut device) = self.compute_device.write() {
            *device = capabilities.best_device();
        }
        if let Ok(mut slot) = self.profile.write() {
            *slot = Some(profile.clone());
        }
        profile
    }

    async fn profile_or_analyze(&self) -> DeviceProfile {
        match self.device_profile() {
            Some(profile) => profile,
            None => self.analyze_device().await,
        }
    }

    pub async fn can_run_model(
        &self,
        model_id: &str,
        precision: Option<Precision>,
    ) -> Result<Feasibility, SdkError> {
        let profile = self.profile_or_analyze().await;
        self.mirror(can_run_model(profile.memory_mb, model_id, precision))
    }

    /// Loads `model_id` once and caches the handle
    pub async fn load_model(
        &self,
        model_id: &str,
        options: LoadOptions,
    ) -> Result<Arc<LoadedModel>, SdkError> {
        let result = self.ensure_loaded(model_id, &options).await;
        self.mirror(result)
    }

    pub(crate) async fn ensure_loaded(
        &self,
        model_id: &str,
        options: &LoadOptions,
    ) -> Result<Arc<LoadedModel>, SdkError> {
        if let Some(loaded) = self.loader.get(model_id) {
            return Ok(loaded);
        }

        let profile = self.profile_or_analyze().await;
        let device = self
            .compute_device
            .read()
            .map(|d| *d)
            .unwrap_or(ComputeDevice::Cpu);

        let start = Instant::now();
        let result = self
            .loader
            .load(model_id, options, profile.memory_mb, device, self.handler.clone())
            .await;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        self.telemetry
            .record(TelemetryEntry::new(model_id, elapsed_ms, 0, result.is_ok()));
        self.telemetry.dispatch_event(serde_json::json!({
            "event": "model_load",
            "model_id": model_id,
            "device_id": self.device_id(),
            "success": result.is_ok(),
            "latency_ms": elapsed_ms,
            "precision": result.as_ref().ok().map(|m| m.precision),
            "context_window": result.as_ref().ok().map(|m| m.context_window),
        }));

        result
    }

    /// Generates with `model_id`, loading it first if needed
    pub async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<GenerateResult, SdkError> {
        let result = async {
            let loaded = self.ensure_loaded(model_id, &LoadOptions::default()).await?;
            self.run_generation(&loaded, prompt, options).await
        }
        .await;
        self.mirror(result)
    }

    pub(crate) async fn run_generation(
        &self,
        loaded: &LoadedModel,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<GenerateResult, SdkError> {
        let start = Instant::now();
        let result = loaded.pipeline.generate(prompt, options).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let tokens = result
            .as_ref()
            .map(|text| estimate_completion_tokens(text))
            .unwrap_or_default();
        self.telemetry.record(TelemetryEntry::new(
            &loaded.model_id,
            latency_ms,
            tokens,
            result.is_ok(),
        ));
        self.telemetry.dispatch_event(serde_json::json!({
            "event": "generate",
            "model_id": loaded.model_id,
            "device_id": self.device_id(),
            "success": result.is_ok(),
            "latency_ms": latency_ms,
            "tokens": tokens,
        }));

        let text = result.map_err(|e| SdkError::Generation(format!("{:#}", e)))?;
        debug!(model_id = %loaded.model_id, latency_ms, tokens, "Generation complete");

        Ok(GenerateResult {
            text,
            model_id: loaded.model_id.clone(),
            latency_ms,
            tokens_estimated: tokens,
        })
    }

    /// Transcribes mono PCM samples with a speech model
    pub async fn transcribe(
        &self,
        model_id: &str,
        audio: &[f32],
        options: &TranscribeOptions,
    ) -> Result<String, SdkError> {
        let result = async {
            let loaded = self.ensure_loaded(model_id, &LoadOptions::default()).await?;

            let start = Instant::now();
            let result = loaded.pipeline.transcribe(audio, options).await;
            let latency_ms = start.elapsed().as_millis() as u64;

            self.telemetry.record(TelemetryEntry::new(
                model_id,
                latency_ms,
                0,
                result.is_ok(),
            ));
            self.telemetry.dispatch_event(serde_json::json!({
                "event": "transcribe",
                "model_id": model_id,
                "device_id": self.device_id(),
                "success": result.is_ok(),
                "latency_ms": latency_ms,
                "samples": audio.len(),
            }));

            result.map_err(|e| SdkError::Transcription(format!("{:#}", e)))
        }
        .await;
        self.mirror(result)
    }

    /// The embedding model, loaded at most once per instance
    pub(crate) async fn embedder(&self) -> Result<Arc<dyn Embedder>, SdkError> {
        self.embedder
            .get_or_try_init(|| async {
                info!(model = %self.embedding_model, "Loading embedding model");
                self.embedding_runtime
                    .load(&self.embedding_model)
                    .await
                    .map_err(|e| SdkError::Embedding(format!("{:#}", e)))
            })
            .await
            .cloned()
    }

    /// Flushes telemetry and drops every model, index and session
    pub async fn destroy(&self) {
        self.telemetry.shutdown().await;
        self.loader.clear();
        self.offline.clear();
        self.api.clear_token();
        if let Ok(mut device_id) = self.device_id.write() {
            *device_id = None;
        }
        info!("SDK destroyed");
    }
}

impl std::fmt::Debug for EdgeSdk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeSdk")
            .field("api", &self.api)
            .field("initialized", &self.is_initialized())
            .field("loaded_models", &self.loaded_models())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::CollectingHandler;
    use crate::runtime::{MockEmbeddingRuntime, MockPipeline, MockRuntime};

    fn sdk_with(runtime: Arc<MockRuntime>, handler: Arc<CollectingHandler>, memory_mb: u64) -> EdgeSdk {
        let config = SdkConfig::default()
            .with_api_key("ei_test")
            .with_api_url("http://127.0.0.1:9")
            .with_telemetry(false);
        EdgeSdk::builder(config)
            .runtime(runtime)
            .embedding_runtime(Arc::new(MockEmbeddingRuntime::default()))
            .identity_store(Arc::new(MemoryIdentityStore::new()))
            .handler(handler)
            .hardware(HardwareCapabilities::synthetic(memory_mb, 4))
            .build()
            .unwrap()
    }

    #[test]
    fn test_estimate_completion_tokens() {
        assert_eq!(estimate_completion_tokens(""), 0);
        assert_eq!(estimate_completion_tokens("abcd"), 1);
        assert_eq!(estimate_completion_tokens("abcde"), 2);
    }

    #[tokio::test]
    async fn test_generate_loads_implicitly_once() {
        let runtime = Arc::new(MockRuntime::new(MockPipeline::new(vec![
            "one".into(),
            "two".into(),
        ])));
        let sdk = sdk_with(runtime.clone(), Arc::new(CollectingHandler::new()), 8192);

        let first = sdk
            .generate("quantum-0.5b", "hi", &GenerateOptions::default())
            .await
            .unwrap();
        let second = sdk
            .generate("quantum-0.5b", "again", &GenerateOptions::default())
            .await
            .unwrap();

        assert_eq!(first.text, "one");
        assert_eq!(second.text, "two");
        assert_eq!(first.tokens_estimated, 1);
        assert_eq!(runtime.load_calls(), 1);
        assert_eq!(sdk.loaded_models(), vec!["quantum-0.5b"]);
    }

    #[tokio::test]
    async fn test_errors_are_mirrored_with_stage() {
        let handler = Arc::new(CollectingHandler::new());
        let sdk = sdk_with(Arc::new(MockRuntime::default()), handler.clone(), 1024);

        let err = sdk
            .load_model("quantum-7b", LoadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::InsufficientMemory { .. }));

        let last = handler.progress().pop().unwrap();
        assert_eq!(last.stage, ProgressStage::Error);
        let events = handler.events_of(EventKind::Error);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["stage"], "model_load");
    }

    #[tokio::test]
    async fn test_generation_failure_maps_to_generation_error() {
        let runtime = Arc::new(MockRuntime::new(MockPipeline::failing("kernel panic")));
        let sdk = sdk_with(runtime, Arc::new(CollectingHandler::new()), 8192);

        let err = sdk
            .generate("quantum-0.5b", "hi", &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Generation(ref m) if m.contains("kernel panic")));
    }

    #[tokio::test]
    async fn test_transcribe_with_speech_model() {
        let runtime = Arc::new(MockRuntime::new(
            MockPipeline::new(vec![]).with_transcript("hello world"),
        ));
        let sdk = sdk_with(runtime.clone(), Arc::new(CollectingHandler::new()), 4096);

        let text = sdk
            .transcribe("whisper-base", &[0.0; 1600], &TranscribeOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "hello world");

        let request = &runtime.requests()[0];
        assert_eq!(request.precision, Precision::Fp32);
    }

    #[tokio::test]
    async fn test_initialize_without_backend_fails_with_auth_stage() {
        let handler = Arc::new(CollectingHandler::new());
        let sdk = sdk_with(Arc::new(MockRuntime::default()), handler.clone(), 4096);

        let err = sdk.initialize().await.unwrap_err();
        assert!(matches!(err, SdkError::Authentication(_)));
        assert!(!sdk.is_initialized());
        assert_eq!(handler.events_of(EventKind::Error)[0].payload["stage"], "auth");
    }

    #[tokio::test]
    async fn test_can_run_model_uses_profiled_memory() {
        let sdk = sdk_with(Arc::new(MockRuntime::default()), Arc::new(CollectingHandler::new()), 2048);
        let report = sdk
            .can_run_model("quantum-1.7b", Some(Precision::Q8))
            .await
            .unwrap();
        assert!(!report.can_run);
        assert_eq!(report.recommended_quant, Some(Precision::Q4));
    }
}
