//! Command-line surface and process bootstrap.
//!
//! # Design
//! - Configuration is loaded and validated before logging is installed, so a bad
//!   document fails fast with exit status 2.
//! - `--check` stops after validation and prints the resolved rule table.
//! - CLI flags override the configured log level and format.

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use hotfolder_config::{
    CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH, LogFormatSetting, ValidatedConfig, load_config,
    validate_config,
};
use hotfolder_dispatch::RuleSet;
use hotfolder_events::EventBus;
use hotfolder_telemetry::{LogFormat, LoggingConfig, Metrics, init_logging};
use tracing::info;

use crate::engine::{Engine, EngineDeps};
use crate::error::{AppError, AppResult};

const BUILD_SHA: &str = match option_env!("HOTFOLDER_BUILD_SHA") {
    Some(sha) => sha,
    None => "dev",
};

/// Hot-folder dispatcher: copies files dropped into source directories to
/// every matching destination.
#[derive(Debug, Parser)]
#[command(name = "hotfolder", version)]
pub struct Cli {
    /// Path to the YAML configuration document.
    #[arg(env = CONFIG_PATH_ENV, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
    /// Log level filter, overriding the configuration (`RUST_LOG` still wins).
    #[arg(long)]
    pub log_level: Option<String>,
    /// Console log format, overriding the configuration.
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormatArg>,
    /// Validate the configuration, print the rule table and exit.
    #[arg(long)]
    pub check: bool,
}

/// Console log formats selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable output.
    Pretty,
    /// One JSON object per line.
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Json => Self::Json,
        }
    }
}

/// Run the dispatcher described by `cli` until it is stopped.
///
/// # Errors
///
/// Returns [`AppError::Config`] when the configuration cannot be loaded or is
/// invalid, and the engine or telemetry error that ended the run otherwise.
pub async fn run_app(cli: Cli) -> AppResult<()> {
    let config = load_validated(&cli.config)?;
    if cli.check {
        let rules = RuleSet::from_config(&config)
            .map_err(|err| AppError::dispatch("engine.rules", err))?;
        print!("{rules}");
        return Ok(());
    }

    let guard = init_logging(&logging_config(&cli, &config))
        .map_err(|err| AppError::telemetry("telemetry.logging", err))?;
    info!(config = %cli.config.display(), build_sha = BUILD_SHA, "configuration loaded");

    let events = EventBus::new();
    let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
    let engine = Engine::new(config, EngineDeps::new(events, metrics).with_logging(guard))?;
    engine.run().await
}

/// Load and validate the document at `path`.
///
/// # Errors
///
/// Returns [`AppError::Config`] tagged `config.load` or `config.validate`.
pub fn load_validated(path: &Path) -> AppResult<ValidatedConfig> {
    let document = load_config(path).map_err(|err| AppError::config("config.load", err))?;
    validate_config(&document).map_err(|err| AppError::config("config.validate", err))
}

fn logging_config<'a>(cli: &'a Cli, config: &'a ValidatedConfig) -> LoggingConfig<'a> {
    let format = cli
        .log_format
        .map(LogFormat::from)
        .or_else(|| config.log_format().map(format_from_setting))
        .unwrap_or_else(LogFormat::infer);
    LoggingConfig {
        level: cli.log_level.as_deref().unwrap_or_else(|| config.log_level()),
        format,
        build_sha: BUILD_SHA,
        log_file: config.log_file(),
    }
}

const fn format_from_setting(setting: LogFormatSetting) -> LogFormat {
    match setting {
        LogFormatSetting::Pretty => LogFormat::Pretty,
        LogFormatSetting::Json => LogFormat::Json,
    }
}
