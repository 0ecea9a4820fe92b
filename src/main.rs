use edgeinfer::cli::commands::{CliArgs, Commands};
use edgeinfer::cli::handlers::{
    handle_ask, handle_generate, handle_models, handle_plan, handle_profile,
};
use edgeinfer::util::logging::{init_logging, parse_level, LoggingConfig};
use edgeinfer::VERSION;

use clap::Parser;
use std::env;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("edgeinfer v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Profile(profile_args) => handle_profile(profile_args).await,
        Commands::Models(models_args) => handle_models(models_args).await,
        Commands::Plan(plan_args) => handle_plan(plan_args).await,
        Commands::Generate(generate_args) => handle_generate(generate_args, args.quiet).await,
        Commands::Ask(ask_args) => handle_ask(ask_args, args.quiet).await,
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level_str) = &args.log_level {
        parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        // The progress bar already covers the normal INFO chatter
        env::var("EDGEINFER_LOG_LEVEL")
            .map(|l| parse_level(&l))
            .unwrap_or(Level::WARN)
    };

    init_logging(LoggingConfig {
        level,
        use_json: env::var("EDGEINFER_LOG_JSON").is_ok_and(|v| v == "true"),
        ..Default::default()
    });
}
