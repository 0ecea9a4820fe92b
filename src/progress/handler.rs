//! Event handler trait and event types
//!
//! Handlers are invoked inline on the calling task. They must not block.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;

/// Stage reported through `on_progress`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
    Start,
    Device,
    Download,
    Loading,
    Done,
    Error,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::Start => "start",
            ProgressStage::Device => "device",
            ProgressStage::Download => "download",
            ProgressStage::Loading => "loading",
            ProgressStage::Done => "done",
            ProgressStage::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub stage: ProgressStage,
    /// 0.0 - 100.0
    pub percent: f32,
    pub message: String,
}

impl ProgressUpdate {
    pub fn new(stage: ProgressStage, percent: f32, message: impl Into<String>) -> Self {
        Self {
            stage,
            percent: percent.clamp(0.0, 100.0),
            message: message.into(),
        }
    }
}

/// Lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DeviceProfiled,
    DeviceRegistered,
    RegistrationFailed,
    ModelLoaded,
    TelemetryFlushed,
    TelemetryError,
    FallbackSuccess,
    FallbackError,
    KbSynced,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DeviceProfiled => "device_profiled",
            EventKind::DeviceRegistered => "device_registered",
            EventKind::RegistrationFailed => "registration_failed",
            EventKind::ModelLoaded => "model_loaded",
            EventKind::TelemetryFlushed => "telemetry_flushed",
            EventKind::TelemetryError => "telemetry_error",
            EventKind::FallbackSuccess => "fallback_success",
            EventKind::FallbackError => "fallback_error",
            EventKind::KbSynced => "kb_synced",
            EventKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SdkEvent {
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl SdkEvent {
    pub fn new(kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Receives progress updates and lifecycle events from the SDK
pub trait EventHandler: Send + Sync {
    fn on_progress(&self, _update: &ProgressUpdate) {}

    fn on_event(&self, _event: &SdkEvent) {}
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl EventHandler for NoOpHandler {}

/// Handler that keeps every update and event in memory
#[derive(Debug, Default)]
pub struct CollectingHandler {
    progress: Mutex<Vec<ProgressUpdate>>,
    events: Mutex<Vec<SdkEvent>>,
}

impl CollectingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> Vec<ProgressUpdate> {
        self.progress
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<SdkEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn events_of(&self, kind: EventKind) -> Vec<SdkEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut p) = self.progress.lock() {
            p.clear();
        }
        if let Ok(mut e) = self.events.lock() {
            e.clear();
        }
    }
}

impl EventHandler for CollectingHandler {
    fn on_progress(&self, update: &ProgressUpdate) {
        if let Ok(mut p) = self.progress.lock() {
            p.push(update.clone());
        }
    }

    fn on_event(&self, event: &SdkEvent) {
        if let Ok(mut e) = self.events.lock() {
            e.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_handler() {
        let handler = NoOpHandler;
        handler.on_progress(&ProgressUpdate::new(ProgressStage::Start, 0.0, "start"));
        handler.on_event(&SdkEvent::new(EventKind::Error, serde_json::json!({})));
    }

    #[test]
    fn test_collecting_handler() {
        let handler = CollectingHandler::new();
        handler.on_progress(&ProgressUpdate::new(ProgressStage::Download, 42.0, "dl"));
        handler.on_event(&SdkEvent::new(
            EventKind::ModelLoaded,
            serde_json::json!({"model_id": "quantum-1.7b"}),
        ));
        handler.on_event(&SdkEvent::new(EventKind::Error, serde_json::json!({})));

        assert_eq!(handler.progress().len(), 1);
        assert_eq!(handler.events().len(), 2);
        assert_eq!(handler.events_of(EventKind::ModelLoaded).len(), 1);

        handler.clear();
        assert!(handler.events().is_empty());
    }

    #[test]
    fn test_percent_is_clamped() {
        let update = ProgressUpdate::new(ProgressStage::Download, 140.0, "over");
        assert_eq!(update.percent, 100.0);
    }

    #[test]
    fn test_event_kind_serializes_snake_case() {
        let json = serde_json::to_string(&EventKind::FallbackSuccess).unwrap();
        assert_eq!(json, "\"fallback_success\"");
        assert_eq!(EventKind::DeviceProfiled.as_str(), "device_profiled");
    }
}
