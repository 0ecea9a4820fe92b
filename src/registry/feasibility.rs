//! Pre-flight memory feasibility checks

use super::models::{ModelCategory, ModelInfo, ModelRegistry};
use crate::error::SdkError;
use crate::planner::{select_precision, Precision};
use serde::Serialize;

/// Outcome of [`can_run_model`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feasibility {
    pub can_run: bool,
    /// Precision the check was made for
    pub precision: Precision,
    /// Minimum RAM for `precision`, when the registry knows it
    pub required_mb: Option<u64>,
    pub available_mb: u64,
    /// Precision to use instead; for LLMs only ever the lowest one
    pub recommended_quant: Option<Precision>,
    pub reason: Option<String>,
}

impl Feasibility {
    /// A missing RAM figure means the precision is not offered at all
    pub fn into_error(self, model_id: &str) -> SdkError {
        match self.required_mb {
            Some(required_mb) => SdkError::InsufficientMemory {
                model: model_id.to_string(),
                required_mb,
                available_mb: self.available_mb,
                recommended: self.recommended_quant,
            },
            None => SdkError::UnsupportedPrecision {
                model: model_id.to_string(),
                precision: self.precision,
                recommended: self.recommended_quant,
            },
        }
    }
}

/// Highest precision of `model` whose minimum RAM fits in `memory_mb`
pub fn best_feasible_precision(model: &ModelInfo, memory_mb: u64) -> Option<Precision> {
    model
        .precisions()
        .into_iter()
        .rev()
        .find(|p| model.min_ram_mb(*p).is_some_and(|req| req <= memory_mb))
}

/// LLMs stay at their lowest precision; STT models take the highest that fits
fn recommended_precision(model: &ModelInfo, memory_mb: u64) -> Option<Precision> {
    match model.category {
        ModelCategory::Llm => model
            .lowest_precision()
            .filter(|p| model.min_ram_mb(*p).is_some_and(|req| req <= memory_mb)),
        ModelCategory::Stt => best_feasible_precision(model, memory_mb),
    }
}

/// Checks whether `model_id` can run on a device with `memory_mb`
///
/// With no explicit precision the planner's choice is checked. Unregistered
/// pass-through models carry no RAM table and are always reported runnable.
pub fn can_run_model(
    memory_mb: u64,
    model_id: &str,
    precision: Option<Precision>,
) -> Result<Feasibility, SdkError> {
    let Some(model) = ModelRegistry::get(model_id) else {
        if ModelRegistry::is_pass_through(model_id) {
            return Ok(Feasibility {
                can_run: true,
                precision: precision.unwrap_or(Precision::LOWEST),
                required_mb: None,
                available_mb: memory_mb,
                recommended_quant: None,
                reason: Some("Unregistered model; memory requirements unknown".to_string()),
            });
        }
        return Err(SdkError::UnknownModel(model_id.to_string()));
    };

    let target = precision.unwrap_or_else(|| select_precision(memory_mb, model_id));
    let recommended = recommended_precision(model, memory_mb);

    let Some(required_mb) = model.min_ram_mb(target) else {
        return Ok(Feasibility {
            can_run: false,
            precision: target,
            required_mb: None,
            available_mb: memory_mb,
            recommended_quant: recommended,
            reason: Some(format!(
                "{} is not available at precision {}",
                model.id, target
            )),
        });
    };

    let can_run = required_mb <= memory_mb;
    let reason = if can_run {
        None
    } else if let Some(alternative) = recommended {
        Some(format!(
            "{} at {} needs {}MB but device has {}MB; {} fits",
            model.id, target, required_mb, memory_mb, alternative
        ))
    } else {
        Some(format!(
            "{} needs at least {}MB even at the lowest precision; device has {}MB",
            model.id,
            model
                .lowest_precision()
                .and_then(|p| model.min_ram_mb(p))
                .unwrap_or(required_mb),
            memory_mb
        ))
    };

    Ok(Feasibility {
        can_run,
        precision: target,
        required_mb: Some(required_mb),
        available_mb: memory_mb,
        recommended_quant: if can_run { Some(target) } else { recommended },
        reason,
    })
}
