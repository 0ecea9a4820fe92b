use crate::planner::Precision;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Profile this machine and run small language models on it
#[derive(Parser, Debug)]
#[command(
    name = "edgeinfer",
    about = "Profile this machine and run small language models on it",
    version,
    long_about = "edgeinfer checks which models and precisions fit this device, runs them \
                  locally and answers questions over local documents."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Print the device profile")]
    Profile(ProfileArgs),

    #[command(about = "List registered models and whether they fit this device")]
    Models(ModelsArgs),

    #[command(
        about = "Show the precision and context window chosen for a model",
        long_about = "Runs the feasibility check for a model on this device.\n\n\
                      Examples:\n  \
                      edgeinfer plan quantum-1.7b\n  \
                      edgeinfer plan quantum-7b --precision q8 --memory-mb 8192"
    )]
    Plan(PlanArgs),

    #[command(
        about = "Generate text with a local model",
        long_about = "Loads the model (downloading it on first use) and generates a completion.\n\n\
                      Examples:\n  \
                      edgeinfer generate quantum-0.5b \"Write a haiku about rust\"\n  \
                      edgeinfer generate quantum-1.7b \"Hello\" --max-tokens 64 --greedy"
    )]
    Generate(GenerateArgs),

    #[command(
        about = "Answer a question from local files",
        long_about = "Chunks and embeds the given files, retrieves the closest passages and \
                      answers with a local model. Nothing leaves the machine.\n\n\
                      Examples:\n  \
                      edgeinfer ask --file notes.md \"When is the launch?\""
    )]
    Ask(AskArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ProfileArgs {
    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ModelsArgs {
    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,

    #[arg(long, value_name = "MB", help = "Assume this much memory instead of detecting it")]
    pub memory_mb: Option<u64>,
}

#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    #[arg(value_name = "MODEL", help = "Registered model id")]
    pub model: String,

    #[arg(short = 'p', long, value_parser = parse_precision, help = "Precision to check (q4, q8, fp16, fp32)")]
    pub precision: Option<Precision>,

    #[arg(long, value_name = "MB", help = "Assume this much memory instead of detecting it")]
    pub memory_mb: Option<u64>,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct GenerationFlags {
    #[arg(long, value_name = "N", default_value = "256", help = "Maximum new tokens")]
    pub max_tokens: usize,

    #[arg(long, default_value = "0.7", help = "Sampling temperature")]
    pub temperature: f64,

    #[arg(long, help = "Greedy decoding")]
    pub greedy: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct GenerateArgs {
    #[arg(value_name = "MODEL", help = "Registered model id or Hugging Face GGUF repository")]
    pub model: String,

    #[arg(value_name = "PROMPT")]
    pub prompt: String,

    #[command(flatten)]
    pub generation: GenerationFlags,
}

#[derive(Parser, Debug, Clone)]
pub struct AskArgs {
    #[arg(value_name = "QUESTION")]
    pub question: String,

    #[arg(long = "file", value_name = "PATH", required = true, help = "Document to search (repeatable)")]
    pub files: Vec<PathBuf>,

    #[arg(short = 'm', long, value_name = "MODEL", help = "Model id (defaults to EDGEINFER_DEFAULT_MODEL)")]
    pub model: Option<String>,

    #[arg(short = 'k', long, default_value = "3", help = "Number of passages to retrieve")]
    pub top_k: usize,

    #[arg(long, help = "Print the retrieved passages")]
    pub show_sources: bool,

    #[command(flatten)]
    pub generation: GenerationFlags,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

fn parse_precision(s: &str) -> Result<Precision, String> {
    s.parse::<Precision>()
}
