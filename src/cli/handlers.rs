//! Subcommand implementations; each returns the process exit code

use super::commands::{AskArgs, GenerateArgs, GenerationFlags, ModelsArgs, PlanArgs, ProfileArgs};
use super::output::{format_answer, ModelRow, OutputFormatter, PlanReport};
use super::progress::BarHandler;
use crate::config::SdkConfig;
use crate::device::DeviceProfiler;
use crate::planner::recommend_context_window;
use crate::progress::NoOpHandler;
use crate::rag::Document;
use crate::registry::{can_run_model, ModelRegistry};
use crate::runtime::GenerateOptions;
use crate::sdk::{EdgeSdk, RagOptions};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

fn exit_code(result: Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

async fn memory_mb(overridden: Option<u64>) -> u64 {
    match overridden {
        Some(mb) => mb,
        None => DeviceProfiler::detect().await.total_memory_mb,
    }
}

fn generate_options(flags: &GenerationFlags) -> GenerateOptions {
    let options = GenerateOptions::default()
        .with_max_new_tokens(flags.max_tokens)
        .with_temperature(flags.temperature);
    if flags.greedy {
        options.greedy()
    } else {
        options
    }
}

/// SDK wired to a progress bar; authenticates when an API key is configured
async fn build_sdk(quiet: bool) -> Result<(EdgeSdk, Arc<BarHandler>)> {
    let config = SdkConfig::default();
    let handler = Arc::new(BarHandler::new(quiet));
    let sdk = EdgeSdk::builder(config)
        .handler(handler.clone())
        .build()
        .context("Failed to create SDK")?;

    if sdk.config().api_key.is_some() {
        if let Err(e) = sdk.initialize().await {
            warn!("Continuing offline: {}", e);
        }
    } else {
        info!("No API key configured; running offline");
    }
    Ok((sdk, handler))
}

pub async fn handle_profile(args: &ProfileArgs) -> i32 {
    exit_code(async {
        let config = SdkConfig::default();
        let profile = DeviceProfiler::analyze(&NoOpHandler, &config.default_model).await;
        let output = OutputFormatter::new(args.format.into()).format_profile(&profile)?;
        print!("{}", output);
        Ok(())
    }
    .await)
}

pub async fn handle_models(args: &ModelsArgs) -> i32 {
    exit_code(async {
        let memory = memory_mb(args.memory_mb).await;
        let rows = ModelRegistry::all()
            .iter()
            .map(|m| Ok(ModelRow::new(m, can_run_model(memory, m.id, None)?)))
            .collect::<Result<Vec<_>>>()?;

        let output = OutputFormatter::new(args.format.into()).format_models(&rows)?;
        print!("{}", output);
        Ok(())
    }
    .await)
}

pub async fn handle_plan(args: &PlanArgs) -> i32 {
    exit_code(async {
        let memory = memory_mb(args.memory_mb).await;
        let feasibility = can_run_model(memory, &args.model, args.precision)?;
        let context_window = if feasibility.can_run {
            recommend_context_window(memory, feasibility.precision)
        } else {
            0
        };

        let report = PlanReport {
            model: args.model.clone(),
            memory_mb: memory,
            context_window,
            feasibility,
        };
        let output = OutputFormatter::new(args.format.into()).format_plan(&report)?;
        print!("{}", output);
        Ok(())
    }
    .await)
}

pub async fn handle_generate(args: &GenerateArgs, quiet: bool) -> i32 {
    exit_code(async {
        let (sdk, bar) = build_sdk(quiet).await?;
        let result = sdk
            .generate(&args.model, &args.prompt, &generate_options(&args.generation))
            .await;
        bar.finish();
        sdk.destroy().await;

        let result = result?;
        println!("{}", result.text.trim());
        info!(
            latency_ms = result.latency_ms,
            tokens = result.tokens_estimated,
            "Generation finished"
        );
        Ok(())
    }
    .await)
}

pub async fn handle_ask(args: &AskArgs, quiet: bool) -> i32 {
    exit_code(async {
        let mut documents = Vec::with_capacity(args.files.len());
        for path in &args.files {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            documents.push(Document::new(name, content).with_id(path.display().to_string()));
        }

        let mut options = RagOptions::default()
            .with_top_k(args.top_k)
            .with_generate(generate_options(&args.generation));
        if let Some(model) = &args.model {
            options = options.with_model(model.clone());
        }

        let (sdk, bar) = build_sdk(quiet).await?;
        let result = sdk
            .rag_query_local(&args.question, &documents, &options)
            .await;
        bar.finish();
        sdk.destroy().await;

        print!("{}", format_answer(&result?, args.show_sources));
        Ok(())
    }
    .await)
}
