//! Turns raw hardware capabilities into a [`DeviceProfile`]

use super::fingerprint::{fingerprint, FingerprintInputs};
use super::hardware::{HardwareCapabilities, HardwareDetector};
use super::profile::DeviceProfile;
use crate::planner::{recommend_context_window, select_precision};
use crate::progress::{EventHandler, EventKind, ProgressStage, ProgressUpdate, SdkEvent};
use tracing::warn;

pub const RUNTIME_NAME: &str = "edgeinfer-rs";

pub struct DeviceProfiler;

impl DeviceProfiler {
    /// Detects hardware and builds a profile, reporting progress to `handler`
    ///
    /// The recommended precision and context window are planned for `model_id`.
    pub async fn analyze(handler: &dyn EventHandler, model_id: &str) -> DeviceProfile {
        let capabilities = Self::detect().await;
        Self::analyze_with(handler, &capabilities, model_id)
    }

    /// Runs OS detection off the async threads
    ///
    /// Never fails: a panicking detection task degrades to minimal capabilities.
    pub async fn detect() -> HardwareCapabilities {
        match tokio::task::spawn_blocking(HardwareDetector::detect).await {
            Ok(caps) => caps,
            Err(e) => {
                warn!("Hardware detection failed, using defaults: {}", e);
                HardwareCapabilities {
                    total_memory_mb: 0,
                    available_memory_mb: 0,
                    cpu_brand: None,
                    ..HardwareCapabilities::synthetic(0, 1)
                }
            }
        }
    }

    /// Same milestones as [`DeviceProfiler::analyze`] over known capabilities
    pub fn analyze_with(
        handler: &dyn EventHandler,
        capabilities: &HardwareCapabilities,
        model_id: &str,
    ) -> DeviceProfile {
        Self::announce(handler);
        Self::report(handler, capabilities, model_id)
    }

    fn announce(handler: &dyn EventHandler) {
        handler.on_progress(&ProgressUpdate::new(
            ProgressStage::Start,
            0.0,
            "Analyzing device capabilities",
        ));
    }

    fn report(
        handler: &dyn EventHandler,
        capabilities: &HardwareCapabilities,
        model_id: &str,
    ) -> DeviceProfile {
        let profile = Self::from_capabilities(capabilities, model_id);

        handler.on_progress(&ProgressUpdate::new(
            ProgressStage::Device,
            100.0,
            profile.summary(),
        ));
        handler.on_event(&SdkEvent::new(
            EventKind::DeviceProfiled,
            serde_json::json!({
                "fingerprint": profile.fingerprint,
                "memory_mb": profile.memory_mb,
                "cpu_cores": profile.cpu_cores,
                "recommended_precision": profile.recommended_precision,
                "recommended_context_window": profile.recommended_context_window,
            }),
        ));

        profile
    }

    /// Deterministic part of profiling
    pub fn from_capabilities(caps: &HardwareCapabilities, model_id: &str) -> DeviceProfile {
        let recommended_precision = select_precision(caps.total_memory_mb, model_id);
        let recommended_context_window =
            recommend_context_window(caps.total_memory_mb, recommended_precision);

        let fingerprint = fingerprint(&FingerprintInputs {
            cpu: caps.cpu_brand.as_deref(),
            cpu_cores: caps.cpu_cores,
            memory_mb: caps.total_memory_mb,
            platform: &caps.platform,
            arch: &caps.arch,
            gpu_renderer: caps.gpu_name.as_deref(),
            screen: None,
        });

        DeviceProfile {
            cpu_cores: caps.cpu_cores,
            cpu_model: caps.cpu_brand.clone(),
            memory_mb: caps.total_memory_mb,
            storage_mb: caps.storage_available_mb,
            platform: caps.platform.clone(),
            arch: caps.arch.clone(),
            os: caps.os_version.clone(),
            gpu_renderer: caps.gpu_name.clone(),
            gpu_vram_mb: caps.gpu_memory_mb,
            screen: None,
            runtime_name: RUNTIME_NAME.to_string(),
            runtime_version: env!("CARGO_PKG_VERSION").to_string(),
            network_type: caps.network_type,
            latency_ms: None,
            timezone: local_timezone(),
            has_parallel_engine: caps.cpu_cores > 1,
            has_gpu_compute: caps.has_gpu_compute(),
            recommended_precision,
            recommended_context_window,
            fingerprint,
        }
    }
}

/// `TZ` when set, otherwise the current UTC offset
fn local_timezone() -> String {
    std::env::var("TZ")
        .ok()
        .filter(|tz| !tz.is_empty())
        .unwrap_or_else(|| chrono::Local::now().format("UTC%:z").to_string())
}
