//! Output formatting for CLI results
//!
//! Every command can print machine-readable JSON or a short human summary.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::device::DeviceProfile;
use crate::planner::Precision;
use crate::rag::RagResponse;
use crate::registry::{Feasibility, ModelInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Human,
}

/// One registry row with its feasibility on this device
#[derive(Debug, Clone, Serialize)]
pub struct ModelRow {
    pub id: &'static str,
    pub display_name: &'static str,
    pub category: String,
    pub params: &'static str,
    pub precisions: Vec<Precision>,
    pub feasibility: Feasibility,
}

impl ModelRow {
    pub fn new(info: &'static ModelInfo, feasibility: Feasibility) -> Self {
        Self {
            id: info.id,
            display_name: info.display_name,
            category: format!("{:?}", info.category).to_lowercase(),
            params: info.params,
            precisions: info.precisions(),
            feasibility,
        }
    }
}

/// Feasibility plus the context window the loader would pick
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub model: String,
    pub memory_mb: u64,
    pub context_window: usize,
    #[serde(flatten)]
    pub feasibility: Feasibility,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_profile(&self, profile: &DeviceProfile) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(profile),
            OutputFormat::Human => Ok(format_profile_human(profile)),
        }
    }

    pub fn format_models(&self, rows: &[ModelRow]) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(rows),
            OutputFormat::Human => Ok(format_models_human(rows)),
        }
    }

    pub fn format_plan(&self, report: &PlanReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Human => Ok(format_plan_human(report)),
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize output to JSON")
}

fn format_profile_human(profile: &DeviceProfile) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Device: {} {} ({})\n",
        profile.platform, profile.arch, profile.os
    ));
    out.push_str(&format!(
        "CPU: {} cores{}\n",
        profile.cpu_cores,
        profile
            .cpu_model
            .as_deref()
            .map(|m| format!(", {}", m))
            .unwrap_or_default()
    ));
    out.push_str(&format!("Memory: {} MB\n", profile.memory_mb));
    out.push_str(&format!("Storage: {} MB free\n", profile.storage_mb));
    match &profile.gpu_renderer {
        Some(gpu) => out.push_str(&format!(
            "GPU: {}{}\n",
            gpu,
            profile
                .gpu_vram_mb
                .map(|v| format!(" ({} MB)", v))
                .unwrap_or_default()
        )),
        None => out.push_str("GPU: none\n"),
    }
    out.push_str(&format!("Network: {:?}\n", profile.network_type));
    out.push_str(&format!("Timezone: {}\n", profile.timezone));
    out.push_str(&format!(
        "Recommended: {} with a {}-token context window\n",
        profile.recommended_precision, profile.recommended_context_window
    ));
    out.push_str(&format!("Fingerprint: {}\n", profile.fingerprint));
    out
}

fn format_models_human(rows: &[ModelRow]) -> String {
    let mut out = format!(
        "{:<16} {:<20} {:<5} {:>6}  {:<8} {}\n",
        "ID", "NAME", "TYPE", "PARAMS", "FITS", "PRECISION"
    );
    for row in rows {
        let fits = if row.feasibility.can_run { "yes" } else { "no" };
        let precision = match (row.feasibility.can_run, row.feasibility.recommended_quant) {
            (true, _) => row.feasibility.precision.to_string(),
            (false, Some(p)) => format!("try {}", p),
            (false, None) => "-".to_string(),
        };
        out.push_str(&format!(
            "{:<16} {:<20} {:<5} {:>6}  {:<8} {}\n",
            row.id, row.display_name, row.category, row.params, fits, precision
        ));
    }
    out
}

fn format_plan_human(report: &PlanReport) -> String {
    let feasibility = &report.feasibility;
    let mut out = format!("Model: {}\n", report.model);
    out.push_str(&format!("Available memory: {} MB\n", report.memory_mb));
    out.push_str(&format!("Precision: {}\n", feasibility.precision));
    if let Some(required) = feasibility.required_mb {
        out.push_str(&format!("Required memory: {} MB\n", required));
    }
    if feasibility.can_run {
        out.push_str(&format!("Context window: {} tokens\n", report.context_window));
        out.push_str("Status: fits\n");
    } else {
        out.push_str(&format!(
            "Status: does not fit{}\n",
            feasibility
                .reason
                .as_deref()
                .map(|r| format!(" ({})", r))
                .unwrap_or_default()
        ));
        if let Some(recommended) = feasibility.recommended_quant {
            out.push_str(&format!("Suggestion: use --precision {}\n", recommended));
        }
    }
    out
}

/// Answer followed by numbered sources when `show_sources` is set
pub fn format_answer(response: &RagResponse, show_sources: bool) -> String {
    let mut out = response.answer.trim().to_string();
    out.push('\n');
    if show_sources {
        out.push_str("\nSources:\n");
        for (i, chunk) in response.chunks.iter().enumerate() {
            let preview: String = chunk.content.chars().take(120).collect();
            out.push_str(&format!(
                "  [{}] {} (score {:.3}): {}\n",
                i + 1,
                chunk.source,
                chunk.similarity,
                preview.replace('\n', " ")
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceProfiler, HardwareCapabilities};
    use crate::registry::{can_run_model, ModelRegistry};

    #[test]
    fn test_models_table_marks_infeasible_rows() {
        let rows: Vec<ModelRow> = ModelRegistry::all()
            .iter()
            .map(|m| ModelRow::new(m, can_run_model(2048, m.id, None).unwrap()))
            .collect();
        let table = OutputFormatter::new(OutputFormat::Human)
            .format_models(&rows)
            .unwrap();

        let line = table.lines().find(|l| l.starts_with("quantum-7b")).unwrap();
        assert!(line.contains("no"));
        let line = table.lines().find(|l| l.starts_with("quantum-0.5b")).unwrap();
        assert!(line.contains("yes"));
    }

    #[test]
    fn test_plan_json_is_flat() {
        let report = PlanReport {
            model: "quantum-1.7b".to_string(),
            memory_mb: 2048,
            context_window: 1024,
            feasibility: can_run_model(2048, "quantum-1.7b", Some(Precision::Q8)).unwrap(),
        };
        let json = OutputFormatter::new(OutputFormat::Json)
            .format_plan(&report)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["canRun"], false);
        assert_eq!(value["recommendedQuant"], "q4");
        assert_eq!(value["context_window"], 1024);
    }

    #[test]
    fn test_profile_human_mentions_recommendation() {
        let profile = DeviceProfiler::from_capabilities(
            &HardwareCapabilities::synthetic(8192, 4),
            "quantum-1.7b",
        );
        let text = OutputFormatter::new(OutputFormat::Human)
            .format_profile(&profile)
            .unwrap();
        assert!(text.contains("Memory: 8192 MB"));
        assert!(text.contains("Recommended: q4"));
    }
}
