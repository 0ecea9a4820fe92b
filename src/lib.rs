//! edgeinfer - on-device inference client
//!
//! Profiles the local machine, picks a model precision and context window that
//! fit it, loads and runs small language and speech models locally, and
//! grounds generation in retrieved context from a knowledge base. Usage is
//! batched to the backend as telemetry, and OpenAI- or Bedrock-shaped callers
//! can drive the same models with an optional cloud fallback.
//!
//! # Core Concepts
//!
//! - **Device profile**: hardware snapshot with a recommended precision and
//!   context window, see [`device`]
//! - **Registry**: known models with per-precision memory requirements, see
//!   [`registry`]
//! - **Runtime**: pluggable backend that actually loads and runs weights, see
//!   [`runtime`]
//! - **RAG tiers**: cloud-indexed (2), fully local (1) and offline-synced (3)
//!   retrieval, see [`rag`] and [`EdgeSdk`]
//!
//! # Example Usage
//!
//! ```no_run
//! use edgeinfer::runtime::GenerateOptions;
//! use edgeinfer::{EdgeSdk, SdkConfig};
//!
//! # async fn run() -> Result<(), edgeinfer::SdkError> {
//! let sdk = EdgeSdk::new(SdkConfig::default().with_api_key("ei_live_..."))?;
//! let profile = sdk.initialize().await?;
//! println!("{}", profile.summary());
//!
//! let result = sdk
//!     .generate("quantum-1.7b", "Explain quantization in one line.", &GenerateOptions::default())
//!     .await?;
//! println!("{}", result.text);
//!
//! sdk.destroy().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod planner;
pub mod progress;
pub mod rag;
pub mod registry;
pub mod runtime;
pub mod sdk;
pub mod telemetry;
pub mod translate;
pub mod util;

pub use config::{ConfigError, FallbackConfig, FallbackProvider, SdkConfig};
pub use device::DeviceProfile;
pub use error::{ErrorStage, Result, SdkError};
pub use planner::Precision;
pub use progress::{EventHandler, EventKind, ProgressStage, ProgressUpdate, SdkEvent};
pub use rag::{Document, RagChunk, RagResponse, RagTier};
pub use registry::{Feasibility, LoadOptions, ModelRegistry};
pub use sdk::{EdgeSdk, EdgeSdkBuilder, GenerateResult, RagOptions};
pub use translate::{openai_compatible, OpenAICompatibleClient, ProtocolTranslator};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
