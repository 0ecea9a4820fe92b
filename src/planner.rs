//! Quantization and context-window planning
//!
//! Pure functions of device memory and model identity. No I/O.

use crate::registry::{ModelCategory, ModelRegistry};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric format a model's weights are run in, ordered lowest to highest fidelity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Q4,
    Q8,
    Fp16,
    Fp32,
}

impl Precision {
    /// All levels, lowest memory first
    pub const ALL: [Precision; 4] = [
        Precision::Q4,
        Precision::Q8,
        Precision::Fp16,
        Precision::Fp32,
    ];

    pub const LOWEST: Precision = Precision::Q4;

    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Q4 => "q4",
            Precision::Q8 => "q8",
            Precision::Fp16 => "fp16",
            Precision::Fp32 => "fp32",
        }
    }

    /// Base context window at the 4-8GB memory tier
    fn base_context(&self) -> usize {
        match self {
            Precision::Q4 => 2048,
            Precision::Q8 => 4096,
            Precision::Fp16 => 4096,
            Precision::Fp32 => 8192,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "q4" | "int4" => Ok(Precision::Q4),
            "q8" | "int8" => Ok(Precision::Q8),
            "fp16" | "f16" => Ok(Precision::Fp16),
            "fp32" | "f32" => Ok(Precision::Fp32),
            other => Err(format!(
                "Unknown precision '{}'. Valid options: q4, q8, fp16, fp32",
                other
            )),
        }
    }
}

pub const MIN_CONTEXT_WINDOW: usize = 512;
pub const MAX_CONTEXT_WINDOW: usize = 32768;

const LOW_MEMORY_MB: u64 = 4096;
const MID_MEMORY_MB: u64 = 8192;
const HIGH_MEMORY_MB: u64 = 16384;

/// Picks the precision to load `model_id` at on a device with `memory_mb`
///
/// LLMs always get the lowest precision: the runtime's weight format has a
/// file-size ceiling that larger precisions exceed on common platforms.
/// Speech models take the highest precision whose minimum RAM fits, and fall
/// back to the lowest level when nothing fits so the feasibility check can
/// report it. Unregistered models are treated as LLMs.
pub fn select_precision(memory_mb: u64, model_id: &str) -> Precision {
    let Some(model) = ModelRegistry::get(model_id) else {
        return Precision::LOWEST;
    };

    match model.category {
        ModelCategory::Llm => Precision::LOWEST,
        ModelCategory::Stt => Precision::ALL
            .iter()
            .rev()
            .copied()
            .find(|p| {
                model
                    .min_ram_mb(*p)
                    .is_some_and(|required| required <= memory_mb)
            })
            .unwrap_or(Precision::LOWEST),
    }
}

/// Context window (tokens) for a device with `memory_mb` running at `precision`
///
/// Non-decreasing in memory for a fixed precision.
pub fn recommend_context_window(memory_mb: u64, precision: Precision) -> usize {
    let base = precision.base_context();

    let window = if memory_mb >= HIGH_MEMORY_MB {
        base * 4
    } else if memory_mb >= MID_MEMORY_MB {
        base * 2
    } else if memory_mb >= LOW_MEMORY_MB {
        base
    } else {
        (base / 2).max(MIN_CONTEXT_WINDOW)
    };

    window.min(MAX_CONTEXT_WINDOW)
}
