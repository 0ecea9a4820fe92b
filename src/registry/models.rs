//! Compiled-in model registry

use crate::planner::Precision;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task a pipeline is loaded for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    TextGeneration,
    SpeechRecognition,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::TextGeneration => "text-generation",
            TaskKind::SpeechRecognition => "speech-recognition",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelCategory {
    Llm,
    Stt,
}

/// Registry entry for a logical model id
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    /// Logical identifier callers use, e.g. `quantum-1.7b`
    pub id: &'static str,
    /// External reference handed to the inference runtime
    pub model_ref: &'static str,
    /// Where the tokenizer lives when the weights repo has none
    pub tokenizer_ref: Option<&'static str>,
    pub task: TaskKind,
    pub category: ModelCategory,
    pub display_name: &'static str,
    pub params: &'static str,
    /// Download size in MB per precision
    pub size_mb: &'static [(Precision, u64)],
    /// Minimum device RAM in MB per precision
    pub min_ram_mb: &'static [(Precision, u64)],
}

impl ModelInfo {
    pub fn size_mb(&self, precision: Precision) -> Option<u64> {
        lookup(self.size_mb, precision)
    }

    pub fn min_ram_mb(&self, precision: Precision) -> Option<u64> {
        lookup(self.min_ram_mb, precision)
    }

    /// Precisions this entry ships, lowest first
    pub fn precisions(&self) -> Vec<Precision> {
        let mut levels: Vec<Precision> = self.min_ram_mb.iter().map(|(p, _)| *p).collect();
        levels.sort();
        levels
    }

    pub fn lowest_precision(&self) -> Option<Precision> {
        self.precisions().first().copied()
    }
}

fn lookup(table: &[(Precision, u64)], precision: Precision) -> Option<u64> {
    table
        .iter()
        .find(|(p, _)| *p == precision)
        .map(|(_, value)| *value)
}

impl ModelInfo {
    pub const QUANTUM_0_5B: ModelInfo = ModelInfo {
        id: "quantum-0.5b",
        model_ref: "Qwen/Qwen2.5-0.5B-Instruct-GGUF",
        tokenizer_ref: Some("Qwen/Qwen2.5-0.5B-Instruct"),
        task: TaskKind::TextGeneration,
        category: ModelCategory::Llm,
        display_name: "Quantum 0.5B",
        params: "0.5B",
        size_mb: &[
            (Precision::Q4, 400),
            (Precision::Q8, 680),
            (Precision::Fp16, 1270),
        ],
        min_ram_mb: &[
            (Precision::Q4, 1024),
            (Precision::Q8, 1536),
            (Precision::Fp16, 2048),
        ],
    };

    pub const QUANTUM_1_7B: ModelInfo = ModelInfo {
        id: "quantum-1.7b",
        model_ref: "Qwen/Qwen2.5-1.5B-Instruct-GGUF",
        tokenizer_ref: Some("Qwen/Qwen2.5-1.5B-Instruct"),
        task: TaskKind::TextGeneration,
        category: ModelCategory::Llm,
        display_name: "Quantum 1.7B",
        params: "1.7B",
        size_mb: &[
            (Precision::Q4, 1120),
            (Precision::Q8, 1890),
            (Precision::Fp16, 3560),
        ],
        min_ram_mb: &[
            (Precision::Q4, 2048),
            (Precision::Q8, 3072),
            (Precision::Fp16, 5120),
        ],
    };

    pub const QUANTUM_3B: ModelInfo = ModelInfo {
        id: "quantum-3b",
        model_ref: "Qwen/Qwen2.5-3B-Instruct-GGUF",
        tokenizer_ref: Some("Qwen/Qwen2.5-3B-Instruct"),
        task: TaskKind::TextGeneration,
        category: ModelCategory::Llm,
        display_name: "Quantum 3B",
        params: "3B",
        size_mb: &[
            (Precision::Q4, 2100),
            (Precision::Q8, 3620),
            (Precision::Fp16, 6800),
        ],
        min_ram_mb: &[
            (Precision::Q4, 3072),
            (Precision::Q8, 5120),
            (Precision::Fp16, 8192),
        ],
    };

    pub const QUANTUM_7B: ModelInfo = ModelInfo {
        id: "quantum-7b",
        model_ref: "Qwen/Qwen2.5-7B-Instruct-GGUF",
        tokenizer_ref: Some("Qwen/Qwen2.5-7B-Instruct"),
        task: TaskKind::TextGeneration,
        category: ModelCategory::Llm,
        display_name: "Quantum 7B",
        params: "7B",
        size_mb: &[
            (Precision::Q4, 4680),
            (Precision::Q8, 8100),
            (Precision::Fp16, 15200),
        ],
        min_ram_mb: &[
            (Precision::Q4, 6144),
            (Precision::Q8, 10240),
            (Precision::Fp16, 16384),
        ],
    };

    pub const WHISPER_TINY: ModelInfo = ModelInfo {
        id: "whisper-tiny",
        model_ref: "openai/whisper-tiny",
        tokenizer_ref: None,
        task: TaskKind::SpeechRecognition,
        category: ModelCategory::Stt,
        display_name: "Whisper Tiny",
        params: "39M",
        size_mb: &[
            (Precision::Q4, 40),
            (Precision::Q8, 75),
            (Precision::Fp16, 150),
            (Precision::Fp32, 300),
        ],
        min_ram_mb: &[
            (Precision::Q4, 128),
            (Precision::Q8, 256),
            (Precision::Fp16, 512),
            (Precision::Fp32, 1024),
        ],
    };

    pub const WHISPER_BASE: ModelInfo = ModelInfo {
        id: "whisper-base",
        model_ref: "openai/whisper-base",
        tokenizer_ref: None,
        task: TaskKind::SpeechRecognition,
        category: ModelCategory::Stt,
        display_name: "Whisper Base",
        params: "74M",
        size_mb: &[
            (Precision::Q4, 80),
            (Precision::Q8, 150),
            (Precision::Fp16, 290),
            (Precision::Fp32, 580),
        ],
        min_ram_mb: &[
            (Precision::Q4, 256),
            (Precision::Q8, 512),
            (Precision::Fp16, 1024),
            (Precision::Fp32, 2048),
        ],
    };

    pub const ALL_MODELS: &'static [ModelInfo] = &[
        Self::QUANTUM_0_5B,
        Self::QUANTUM_1_7B,
        Self::QUANTUM_3B,
        Self::QUANTUM_7B,
        Self::WHISPER_TINY,
        Self::WHISPER_BASE,
    ];
}

/// Lookup over the compiled-in entries
pub struct ModelRegistry;

impl ModelRegistry {
    pub fn get(model_id: &str) -> Option<&'static ModelInfo> {
        ModelInfo::ALL_MODELS.iter().find(|m| m.id == model_id)
    }

    pub fn all() -> &'static [ModelInfo] {
        ModelInfo::ALL_MODELS
    }

    /// An unregistered id can still be loaded when it names an external
    /// repository (`org/name`, optionally `org/name:file`)
    pub fn is_pass_through(model_id: &str) -> bool {
        let repo = model_id.split(':').next().unwrap_or_default();
        let mut parts = repo.split('/');
        matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(org), Some(name), None) if !org.is_empty() && !name.is_empty()
        )
    }
}
