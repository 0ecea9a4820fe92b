//! Structured logging setup
//!
//! Hosts embedding the SDK usually install their own subscriber. These helpers
//! exist for the CLI and for small programs that want sensible defaults:
//! pretty console output, optional JSON, and `RUST_LOG` still honoured.
//!
//! ```no_run
//! use edgeinfer::util::logging;
//!
//! logging::init_from_env();
//! tracing::info!(model = "quantum-1.7b", "Loading model");
//! ```

use crate::config::SdkConfig;
use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Crates whose debug output drowns ours unless `RUST_LOG` says otherwise
const NOISY_CRATES: &[&str] = &["h2", "hyper", "hyper_util", "reqwest", "tokenizers"];

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    /// JSON lines instead of human-readable output
    pub use_json: bool,
    pub include_target: bool,
    /// File and line number of the call site
    pub include_location: bool,
    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// JSON output with call-site and thread metadata, for log shippers
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
            include_thread_ids: true,
        }
    }

    pub fn from_sdk_config(config: &SdkConfig) -> Self {
        Self::with_level(parse_level(&config.log_level))
    }
}

/// Parses a level name case-insensitively, falling back to INFO
///
/// ```
/// use edgeinfer::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("Debug"), Level::DEBUG);
/// assert_eq!(parse_level("nonsense"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn build_filter(level: Level) -> EnvFilter {
    let mut filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    if env::var("RUST_LOG").is_err() {
        for krate in NOISY_CRATES {
            if let Ok(directive) = format!("{}=warn", krate).parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    filter
}

/// Installs the global subscriber. Only the first call has any effect.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(config.level);
        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(config.include_target)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.include_thread_ids)
            .with_thread_names(config.include_thread_ids);

        // try_init: a host may already have installed a subscriber
        let result = if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer.json())
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
        };

        if let Err(e) = result {
            eprintln!("edgeinfer: logging already initialized ({})", e);
        }
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Reads `EDGEINFER_LOG_LEVEL` and `EDGEINFER_LOG_JSON`
pub fn init_from_env() {
    let level = env::var("EDGEINFER_LOG_LEVEL")
        .map(|l| parse_level(&l))
        .unwrap_or(Level::INFO);

    let use_json = env::var("EDGEINFER_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    init_logging(LoggingConfig {
        level,
        use_json,
        ..Default::default()
    });
}
