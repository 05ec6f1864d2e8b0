pub mod cli;
pub mod clients;
pub mod config;
pub mod constants;
pub mod context;
pub mod db;
pub mod entities;
pub mod models;
pub mod parser;
pub mod services;

use anyhow::Context as _;
use clap::Parser;
use cli::{Cli, Commands, cmd_check, cmd_history, cmd_init, cmd_parse, cmd_run};
pub use config::Config;
use config::GeneralConfig;
use std::path::Path;
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the stdout layer and, when a log directory is configured, a
/// daily rolling file layer. The returned guard flushes the file writer on
/// drop and must outlive every log call.
fn init_logging(general: &GeneralConfig) -> anyhow::Result<Option<WorkerGuard>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&general.log_level));
    let json = general.log_format.eq_ignore_ascii_case("json");

    let mut layers: Vec<BoxedLayer> = Vec::new();
    layers.push(if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    });

    let guard = if general.log_directory.is_empty() {
        None
    } else {
        std::fs::create_dir_all(&general.log_directory).with_context(|| {
            format!("Failed to create log directory {}", general.log_directory)
        })?;
        let appender = tracing_appender::rolling::daily(&general.log_directory, "anisync.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);
        layers.push(if json {
            file_layer.json().boxed()
        } else {
            file_layer.boxed()
        });
        Some(guard)
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("Failed to initialise logging")?;

    Ok(guard)
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    config.validate()?;
    Ok(config)
}

pub async fn run() -> anyhow::Result<()> {
    let Cli { config, command } = Cli::parse();
    let command = command.unwrap_or_default();

    if matches!(command, Commands::Init) {
        let path = config.unwrap_or_else(Config::default_config_path);
        return cmd_init(&path);
    }

    let config = load_config(config.as_deref())?;
    let _guard = init_logging(&config.general)?;

    let result = match command {
        Commands::Run { status, dry_run } => cmd_run(config, status, dry_run).await,
        Commands::History { limit } => cmd_history(&config, limit).await,
        Commands::Check { name } => cmd_check(&config, &name.join(" ")).await,
        Commands::Parse { name } => {
            cmd_parse(&name.join(" "));
            Ok(())
        }
        Commands::Init => Ok(()),
    };

    result.inspect_err(|e| error!(error = %format!("{e:#}"), "anisync failed"))
}
