//! Terminal progress rendering for SDK progress updates

use crate::progress::{EventHandler, EventKind, ProgressStage, ProgressUpdate, SdkEvent};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{debug, warn};

const TEMPLATE: &str = "{spinner:.cyan} {msg:40!} [{bar:30.cyan/blue}] {pos:>3}%";

/// Renders progress updates as a single bar on stderr
pub struct BarHandler {
    bar: ProgressBar,
}

impl BarHandler {
    pub fn new(quiet: bool) -> Self {
        let bar = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::stderr());
        if quiet {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        match ProgressStyle::with_template(TEMPLATE) {
            Ok(style) => bar.set_style(style.progress_chars("=> ")),
            Err(e) => debug!("Falling back to default progress style: {}", e),
        }
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl EventHandler for BarHandler {
    fn on_progress(&self, update: &ProgressUpdate) {
        match update.stage {
            ProgressStage::Error => {
                self.bar.abandon_with_message(update.message.clone());
            }
            ProgressStage::Done => {
                self.bar.set_position(100);
                self.bar.set_message(update.message.clone());
            }
            _ => {
                self.bar.set_position(update.percent.clamp(0.0, 100.0) as u64);
                self.bar.set_message(update.message.clone());
            }
        }
    }

    fn on_event(&self, event: &SdkEvent) {
        match event.kind {
            EventKind::Error | EventKind::FallbackError | EventKind::TelemetryError => {
                warn!(kind = event.kind.as_str(), payload = %event.payload, "SDK event")
            }
            _ => debug!(kind = event.kind.as_str(), payload = %event.payload, "SDK event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_follows_updates() {
        let handler = BarHandler::new(true);
        handler.on_progress(&ProgressUpdate::new(ProgressStage::Download, 42.0, "Downloading"));
        assert_eq!(handler.bar.position(), 42);

        handler.on_progress(&ProgressUpdate::new(ProgressStage::Done, 100.0, "Ready"));
        assert_eq!(handler.bar.position(), 100);
        handler.finish();
        assert!(handler.bar.is_finished());
    }
}
