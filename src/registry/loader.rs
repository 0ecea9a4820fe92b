//! Load-once model cache in front of an [`InferenceRuntime`]

use super::feasibility::can_run_model;
use super::models::{ModelInfo, ModelRegistry, TaskKind};
use crate::device::ComputeDevice;
use crate::error::SdkError;
use crate::planner::{recommend_context_window, Precision};
use crate::progress::{EventHandler, EventKind, ProgressStage, ProgressUpdate, SdkEvent};
use crate::runtime::{InferenceRuntime, LoadRequest, ModelPipeline, ProgressCallback, RuntimeProgress};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Overrides the planner's choice
    pub precision: Option<Precision>,
    /// Overrides the profiled best device
    pub device: Option<ComputeDevice>,
    /// Task for unregistered models; registered ones carry their own
    pub task: Option<TaskKind>,
}

impl LoadOptions {
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_device(mut self, device: ComputeDevice) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_task(mut self, task: TaskKind) -> Self {
        self.task = Some(task);
        self
    }
}

/// A materialized model and what it was resolved to
pub struct LoadedModel {
    pub model_id: String,
    pub pipeline: Arc<dyn ModelPipeline>,
    pub task: TaskKind,
    pub precision: Precision,
    pub context_window: usize,
    /// `None` for pass-through references
    pub info: Option<&'static ModelInfo>,
    pub load_time_ms: u64,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("model_id", &self.model_id)
            .field("task", &self.task)
            .field("precision", &self.precision)
            .field("context_window", &self.context_window)
            .field("registered", &self.info.is_some())
            .finish()
    }
}

type Slot = Arc<OnceCell<Arc<LoadedModel>>>;

pub struct ModelLoader {
    runtime: Arc<dyn InferenceRuntime>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ModelLoader {
    pub fn new(runtime: Arc<dyn InferenceRuntime>) -> Self {
        Self {
            runtime,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn runtime_name(&self) -> &str {
        self.runtime.name()
    }

    fn slot(&self, model_id: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(model_id.to_string()).or_default().clone()
    }

    pub fn get(&self, model_id: &str) -> Option<Arc<LoadedModel>> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(model_id).and_then(|slot| slot.get().cloned())
    }

    pub fn loaded_ids(&self) -> Vec<String> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Drops every handle
    pub fn clear(&self) {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Loads `model_id` once; later calls return the cached handle
    ///
    /// Feasibility is checked before the runtime is touched, so unknown and
    /// oversized models fail without any download.
    pub async fn load(
        &self,
        model_id: &str,
        options: &LoadOptions,
        memory_mb: u64,
        default_device: ComputeDevice,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Arc<LoadedModel>, SdkError> {
        if let Some(loaded) = self.get(model_id) {
            debug!(model_id, "Model already loaded");
            return Ok(loaded);
        }

        let slot = self.slot(model_id);
        slot.get_or_try_init(|| {
            self.load_uncached(model_id, options, memory_mb, default_device, handler)
        })
        .await
        .cloned()
    }

    async fn load_uncached(
        &self,
        model_id: &str,
        options: &LoadOptions,
        memory_mb: u64,
        default_device: ComputeDevice,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Arc<LoadedModel>, SdkError> {
        let start = Instant::now();

        let feasibility = can_run_model(memory_mb, model_id, options.precision)?;
        if !feasibility.can_run {
            warn!(
                model_id,
                reason = feasibility.reason.as_deref().unwrap_or_default(),
                "Model rejected by feasibility check"
            );
            return Err(feasibility.into_error(model_id));
        }

        let info = ModelRegistry::get(model_id);
        let precision = feasibility.precision;
        let task = info
            .map(|m| m.task)
            .or(options.task)
            .unwrap_or(TaskKind::TextGeneration);
        let device = options.device.unwrap_or(default_device);

        let request = LoadRequest {
            task,
            model_ref: info.map_or_else(|| model_id.to_string(), |m| m.model_ref.to_string()),
            tokenizer_ref: info.and_then(|m| m.tokenizer_ref).map(str::to_string),
            precision,
            device,
        };

        info!(
            model_id,
            model_ref = %request.model_ref,
            %precision,
            %device,
            runtime = self.runtime.name(),
            "Loading model"
        );
        handler.on_progress(&ProgressUpdate::new(
            ProgressStage::Start,
            0.0,
            format!("Loading {} ({})", model_id, precision),
        ));

        let throttle = Arc::new(ProgressThrottle::new(handler.clone()));
        let callback: ProgressCallback = {
            let throttle = throttle.clone();
            Arc::new(move |event| throttle.observe(event))
        };

        let pipeline = self
            .runtime
            .load(request, callback)
            .await
            .map_err(|e| SdkError::RuntimeLoadFailure {
                model: model_id.to_string(),
                message: format!("{:#}", e),
            })?;

        let recommended = recommend_context_window(memory_mb, precision);
        let context_window = match (info, pipeline.context_length()) {
            (Some(_), Some(detected)) => detected.min(recommended),
            (Some(_), None) => recommended,
            (None, detected) => detected.unwrap_or(recommended),
        };

        let loaded = Arc::new(LoadedModel {
            model_id: model_id.to_string(),
            pipeline,
            task,
            precision,
            context_window,
            info,
            load_time_ms: start.elapsed().as_millis() as u64,
        });

        handler.on_progress(&ProgressUpdate::new(
            ProgressStage::Done,
            100.0,
            format!("{} ready", model_id),
        ));
        handler.on_event(&SdkEvent::new(
            EventKind::ModelLoaded,
            serde_json::json!({
                "model_id": model_id,
                "precision": precision,
                "context_window": context_window,
                "load_time_ms": loaded.load_time_ms,
            }),
        ));
        info!(model_id, context_window, load_time_ms = loaded.load_time_ms, "Model loaded");

        Ok(loaded)
    }
}

/// Smooths raw runtime progress into monotonic percentages
///
/// Only emits when the whole-number percentage grows, plus once for every
/// file start and finish.
struct ProgressThrottle {
    handler: Arc<dyn EventHandler>,
    last_percent: Mutex<Option<u8>>,
}

impl ProgressThrottle {
    fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self {
            handler,
            last_percent: Mutex::new(None),
        }
    }

    fn observe(&self, event: RuntimeProgress) {
        let mut last = self.last_percent.lock().unwrap_or_else(|e| e.into_inner());
        let floor = last.unwrap_or(0);

        let (stage, percent, message, terminal) = match &event {
            RuntimeProgress::Initiate { file } => {
                (ProgressStage::Download, floor, format!("Fetching {}", file), true)
            }
            RuntimeProgress::Download {
                file,
                loaded,
                total: Some(total),
            } if *total > 0 => {
                let pct = ((*loaded).min(*total) * 100 / total) as u8;
                (ProgressStage::Download, pct, format!("Downloading {}", file), false)
            }
            RuntimeProgress::Download { .. } => return,
            RuntimeProgress::Progress { file, percent } => (
                ProgressStage::Download,
                percent.clamp(0.0, 100.0) as u8,
                format!("Downloading {}", file),
                false,
            ),
            RuntimeProgress::Done { file } => {
                (ProgressStage::Download, floor, format!("Fetched {}", file), true)
            }
            RuntimeProgress::Ready => (ProgressStage::Loading, 100, "Weights loaded".to_string(), true),
        };

        let percent = percent.max(floor);
        if !terminal && last.is_some_and(|l| percent <= l) {
            return;
        }

        *last = Some(percent);
        drop(last);
        self.handler
            .on_progress(&ProgressUpdate::new(stage, percent as f32, message));
    }
}
