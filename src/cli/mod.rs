pub mod commands;
pub mod handlers;
pub mod output;
pub mod progress;

pub use commands::{AskArgs, CliArgs, Commands, GenerateArgs, ModelsArgs, PlanArgs, ProfileArgs};
pub use output::{OutputFormat, OutputFormatter};
