use super::hardware::NetworkType;
use crate::planner::Precision;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenGeometry {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
}

impl ScreenGeometry {
    pub fn describe(&self) -> String {
        format!("{}x{}@{}", self.width, self.height, self.pixel_ratio)
    }
}

/// Snapshot of what this device can do, produced once per profiling run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub cpu_cores: usize,
    pub cpu_model: Option<String>,
    pub memory_mb: u64,
    pub storage_mb: u64,
    pub platform: String,
    pub arch: String,
    pub os: String,
    pub gpu_renderer: Option<String>,
    pub gpu_vram_mb: Option<u64>,
    pub screen: Option<ScreenGeometry>,
    pub runtime_name: String,
    pub runtime_version: String,
    pub network_type: NetworkType,
    /// Refreshed opportunistically; everything else is fixed after profiling
    pub latency_ms: Option<u64>,
    pub timezone: String,
    pub has_parallel_engine: bool,
    pub has_gpu_compute: bool,
    pub recommended_precision: Precision,
    pub recommended_context_window: usize,
    pub fingerprint: String,
}

impl DeviceProfile {
    pub fn with_latency(mut self, latency_ms: Option<u64>) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// One-line capability summary for progress messages
    pub fn summary(&self) -> String {
        format!(
            "{} cores, {}MB RAM, GPU: {}, {} @ {} tokens",
            self.cpu_cores,
            self.memory_mb,
            self.gpu_renderer.as_deref().unwrap_or("none"),
            self.recommended_precision,
            self.recommended_context_window
        )
    }
}
