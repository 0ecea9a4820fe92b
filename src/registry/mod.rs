//! Model registry, feasibility checks and the load-once model cache

mod feasibility;
mod loader;
mod models;

pub use feasibility::{best_feasible_precision, can_run_model, Feasibility};
pub use loader::{LoadOptions, LoadedModel, ModelLoader};
pub use models::{ModelCategory, ModelInfo, ModelRegistry, TaskKind};
