//! Logging-based event handler

use super::{EventHandler, EventKind, ProgressStage, ProgressUpdate, SdkEvent};
use tracing::{debug, info, warn};

/// Handler that logs progress and events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_progress(&self, update: &ProgressUpdate) {
        match update.stage {
            ProgressStage::Error => {
                warn!(stage = update.stage.as_str(), message = %update.message, "Progress failed");
            }
            ProgressStage::Download | ProgressStage::Loading => {
                debug!(
                    stage = update.stage.as_str(),
                    percent = update.percent,
                    message = %update.message,
                    "Progress"
                );
            }
            _ => {
                info!(
                    stage = update.stage.as_str(),
                    percent = update.percent,
                    message = %update.message,
                    "Progress"
                );
            }
        }
    }

    fn on_event(&self, event: &SdkEvent) {
        match event.kind {
            EventKind::Error
            | EventKind::FallbackError
            | EventKind::TelemetryError
            | EventKind::RegistrationFailed => {
                warn!(event = event.kind.as_str(), payload = %event.payload, "SDK event");
            }
            _ => {
                debug!(event = event.kind.as_str(), payload = %event.payload, "SDK event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_all_stages() {
        let handler = LoggingHandler;
        let stages = [
            ProgressStage::Start,
            ProgressStage::Device,
            ProgressStage::Download,
            ProgressStage::Loading,
            ProgressStage::Done,
            ProgressStage::Error,
        ];
        for stage in stages {
            handler.on_progress(&ProgressUpdate::new(stage, 50.0, "test"));
        }
        handler.on_event(&SdkEvent::new(
            EventKind::FallbackError,
            serde_json::json!({"error": "boom"}),
        ));
    }
}
