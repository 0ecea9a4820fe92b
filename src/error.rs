//! Error types for SDK operations
//!
//! Every public async operation returns [`SdkError`]. Each variant maps to an
//! [`ErrorStage`] so hosts can tell an authentication failure from a model load
//! failure without parsing messages.

use crate::config::ConfigError;
use crate::planner::Precision;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    Auth,
    Device,
    ModelLoad,
    Inference,
    Transcription,
    Rag,
    Sync,
    Fallback,
    Config,
}

impl ErrorStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStage::Auth => "auth",
            ErrorStage::Device => "device",
            ErrorStage::ModelLoad => "model_load",
            ErrorStage::Inference => "inference",
            ErrorStage::Transcription => "transcription",
            ErrorStage::Rag => "rag",
            ErrorStage::Sync => "sync",
            ErrorStage::Fallback => "fallback",
            ErrorStage::Config => "config",
        }
    }
}

impl fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("SDK not initialized. Call initialize() first")]
    NotInitialized,

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error(
        "Insufficient memory for {model}: requires {required_mb}MB, device has {available_mb}MB{}",
        recommended.map(|p| format!(". Try precision '{}' instead", p)).unwrap_or_default()
    )]
    InsufficientMemory {
        model: String,
        required_mb: u64,
        available_mb: u64,
        recommended: Option<Precision>,
    },

    #[error(
        "{model} is not available at precision {precision}{}",
        recommended.map(|p| format!(". Try precision '{}' instead", p)).unwrap_or_default()
    )]
    UnsupportedPrecision {
        model: String,
        precision: Precision,
        recommended: Option<Precision>,
    },

    #[error("Failed to load model {model}: {message}")]
    RuntimeLoadFailure { model: String, message: String },

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Knowledge base {0} has not been synced. Call sync_knowledge_base() first")]
    NotSynced(String),

    #[error("Offline index for knowledge base {kb_id} expired at {expired_at}. Re-sync required")]
    Expired { kb_id: String, expired_at: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Cloud fallback failed: {0}")]
    Fallback(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SdkError {
    /// Stage tag attached to mirrored `error` events
    pub fn stage(&self) -> ErrorStage {
        match self {
            SdkError::NotInitialized | SdkError::Authentication(_) => ErrorStage::Auth,
            SdkError::UnknownModel(_)
            | SdkError::InsufficientMemory { .. }
            | SdkError::UnsupportedPrecision { .. }
            | SdkError::RuntimeLoadFailure { .. } => ErrorStage::ModelLoad,
            SdkError::Generation(_) | SdkError::InvalidRequest(_) => ErrorStage::Inference,
            SdkError::Transcription(_) => ErrorStage::Transcription,
            SdkError::Embedding(_) => ErrorStage::Rag,
            SdkError::NotSynced(_) | SdkError::Expired { .. } => ErrorStage::Sync,
            SdkError::Network(_) | SdkError::Api { .. } => ErrorStage::Rag,
            SdkError::Fallback(_) => ErrorStage::Fallback,
            SdkError::Config(_) => ErrorStage::Config,
            SdkError::Io(_) => ErrorStage::Device,
        }
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => SdkError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => SdkError::Network(err.to_string()),
        }
    }
}

pub type Result<T, E = SdkError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_memory_names_alternative() {
        let err = SdkError::InsufficientMemory {
            model: "quantum-1.7b".to_string(),
            required_mb: 3072,
            available_mb: 2048,
            recommended: Some(Precision::Q4),
        };
        let message = err.to_string();
        assert!(message.contains("3072MB"));
        assert!(message.contains("'q4'"));
        assert_eq!(err.stage(), ErrorStage::ModelLoad);
    }

    #[test]
    fn test_insufficient_memory_without_alternative() {
        let err = SdkError::InsufficientMemory {
            model: "quantum-8b".to_string(),
            required_mb: 6144,
            available_mb: 1024,
            recommended: None,
        };
        assert!(!err.to_string().contains("Try precision"));
    }

    #[test]
    fn test_unsupported_precision_is_not_a_memory_error() {
        let err = SdkError::UnsupportedPrecision {
            model: "quantum-1.7b".to_string(),
            precision: Precision::Fp32,
            recommended: Some(Precision::Q4),
        };
        let message = err.to_string();
        assert_eq!(
            message,
            "quantum-1.7b is not available at precision fp32. Try precision 'q4' instead"
        );
        assert!(!message.contains("memory"));
        assert_eq!(err.stage(), ErrorStage::ModelLoad);
    }

    #[test]
    fn test_stage_mapping() {
        assert_eq!(SdkError::NotInitialized.stage(), ErrorStage::Auth);
        assert_eq!(
            SdkError::NotSynced("kb".into()).stage(),
            ErrorStage::Sync
        );
        assert_eq!(
            SdkError::Generation("boom".into()).stage().as_str(),
            "inference"
        );
    }
}
