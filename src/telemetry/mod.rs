//! Telemetry batching
//!
//! Inference and load outcomes are buffered and shipped in FIFO batches,
//! either as soon as [`BATCH_SIZE`] entries are waiting or when a single
//! delayed flush timer fires. Delivery runs on detached tasks; a failed batch
//! goes back to the front of the buffer, which never holds more than
//! [`MAX_BUFFERED`] entries.

use crate::error::SdkError;
use crate::progress::{EventHandler, EventKind, SdkEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const BATCH_SIZE: usize = 10;
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(60);
pub const MAX_BUFFERED: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEntry {
    pub latency_ms: u64,
    pub tokens_generated: usize,
    pub success: bool,
    pub model_id: String,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryEntry {
    pub fn new(model_id: impl Into<String>, latency_ms: u64, tokens_generated: usize, success: bool) -> Self {
        Self {
            latency_ms,
            tokens_generated,
            success,
            model_id: model_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Delivers telemetry to the collector
#[async_trait]
pub trait TelemetryTransport: Send + Sync {
    async fn send_batch(&self, device_id: &str, entries: &[TelemetryEntry]) -> Result<(), SdkError>;

    /// Legacy per-event endpoint
    async fn send_event(&self, _event: &serde_json::Value) -> Result<(), SdkError> {
        Ok(())
    }
}

#[derive(Default)]
struct BatchState {
    buffer: VecDeque<TelemetryEntry>,
    timer: Option<JoinHandle<()>>,
    /// Set once authentication has succeeded
    device_id: Option<String>,
}

struct Shared {
    transport: Arc<dyn TelemetryTransport>,
    handler: Arc<dyn EventHandler>,
    state: Mutex<BatchState>,
    flush_interval: Duration,
    enabled: bool,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, BatchState> {
        // The buffer is plain data; a poisoned lock still holds a usable queue
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Synchronous half of a flush: clears the timer and empties the buffer
    fn take_batch(&self, from_timer: bool) -> Option<(String, Vec<TelemetryEntry>)> {
        let mut state = self.state();

        if let Some(timer) = state.timer.take() {
            if !from_timer {
                timer.abort();
            }
        }

        let device_id = state.device_id.clone()?;
        if state.buffer.is_empty() {
            return None;
        }

        let batch: Vec<TelemetryEntry> = state.buffer.drain(..).collect();
        Some((device_id, batch))
    }

    async fn deliver(&self, device_id: String, batch: Vec<TelemetryEntry>) {
        let count = batch.len();
        match self.transport.send_batch(&device_id, &batch).await {
            Ok(()) => {
                debug!(count, "Telemetry batch delivered");
                self.handler.on_event(&SdkEvent::new(
                    EventKind::TelemetryFlushed,
                    serde_json::json!({ "count": count }),
                ));
            }
            Err(e) => {
                warn!(count, error = %e, "Telemetry delivery failed, re-queueing batch");
                {
                    let mut state = self.state();
                    for entry in batch.into_iter().rev() {
                        state.buffer.push_front(entry);
                    }
                    truncate_oldest(&mut state.buffer);
                }
                self.handler.on_event(&SdkEvent::new(
                    EventKind::TelemetryError,
                    serde_json::json!({ "count": count, "error": e.to_string() }),
                ));
            }
        }
    }
}

fn truncate_oldest(buffer: &mut VecDeque<TelemetryEntry>) {
    while buffer.len() > MAX_BUFFERED {
        buffer.pop_front();
    }
}

/// Buffers [`TelemetryEntry`] values and flushes them in the background
#[derive(Clone)]
pub struct TelemetryBatcher {
    shared: Arc<Shared>,
}

impl TelemetryBatcher {
    pub fn new(transport: Arc<dyn TelemetryTransport>, handler: Arc<dyn EventHandler>) -> Self {
        Self::with_options(transport, handler, FLUSH_INTERVAL, true)
    }

    pub fn with_options(
        transport: Arc<dyn TelemetryTransport>,
        handler: Arc<dyn EventHandler>,
        flush_interval: Duration,
        enabled: bool,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                handler,
                state: Mutex::new(BatchState::default()),
                flush_interval,
                enabled,
            }),
        }
    }

    /// Opens the gate for delivery; flushes before this are no-ops
    pub fn set_device(&self, device_id: impl Into<String>) {
        self.shared.state().device_id = Some(device_id.into());
    }

    pub fn buffered(&self) -> usize {
        self.shared.state().buffer.len()
    }

    pub fn has_pending_timer(&self) -> bool {
        self.shared
            .state()
            .timer
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Appends an entry. Never blocks on the network.
    pub fn record(&self, entry: TelemetryEntry) {
        if !self.shared.enabled {
            return;
        }

        let should_flush = {
            let mut state = self.shared.state();
            state.buffer.push_back(entry);
            truncate_oldest(&mut state.buffer);
            state.buffer.len() >= BATCH_SIZE
        };

        if should_flush {
            self.spawn_flush();
        } else {
            self.arm_timer();
        }
    }

    fn spawn_flush(&self) {
        let Some((device_id, batch)) = self.shared.take_batch(false) else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let shared = self.shared.clone();
                runtime.spawn(async move { shared.deliver(device_id, batch).await });
            }
            Err(_) => {
                // No runtime to deliver on; keep the entries for the next flush
                let mut state = self.shared.state();
                for entry in batch.into_iter().rev() {
                    state.buffer.push_front(entry);
                }
            }
        }
    }

    fn arm_timer(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let mut state = self.shared.state();
        if state.timer.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let shared = self.shared.clone();
        let interval = self.shared.flush_interval;
        state.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(interval).await;
            if let Some((device_id, batch)) = shared.take_batch(true) {
                shared.deliver(device_id, batch).await;
            }
        }));
    }

    /// Flushes now and waits for the delivery attempt
    pub async fn flush(&self) {
        if let Some((device_id, batch)) = self.shared.take_batch(false) {
            self.shared.deliver(device_id, batch).await;
        }
    }

    /// Forwards a single event to the legacy endpoint without waiting
    pub fn dispatch_event(&self, event: serde_json::Value) {
        if !self.shared.enabled {
            return;
        }
        if self.shared.state().device_id.is_none() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let shared = self.shared.clone();
        runtime.spawn(async move {
            if let Err(e) = shared.transport.send_event(&event).await {
                debug!(error = %e, "Telemetry event dropped");
            }
        });
    }

    /// Final flush; the timer is cancelled
    pub async fn shutdown(&self) {
        self.flush().await;
        if let Some(timer) = self.shared.state().timer.take() {
            timer.abort();
        }
    }
}

impl std::fmt::Debug for TelemetryBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryBatcher")
            .field("buffered", &self.buffered())
            .field("enabled", &self.shared.enabled)
            .finish()
    }
}
