use std::env;

use anyhow::{Context, anyhow};
use schoolhub_server::AppContext;
use schoolhub_server::config::loader::{DEFAULT_CONFIG_FILE, load_config};
use schoolhub_server::observability;

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    CliArgument,
    EnvironmentVariable,
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (SCHOOLHUB_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    observability::init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let (config_path, source) = resolve_config_path(&args);
    let cfg = load_config(Some(&config_path)).map_err(|e| anyhow!("configuration error: {e}"))?;

    if args.iter().any(|a| a == "--print-config") {
        println!("{}", toml::to_string_pretty(&cfg)?);
        return Ok(());
    }

    observability::apply_logging_level(&cfg.logging.level);
    tracing::info!(path = %config_path, source = %source, "Configuration loaded");

    let ctx = AppContext::build(&cfg)
        .await
        .context("failed to build application context")?;
    for (namespace, stats) in ctx.cache_stats().await {
        tracing::debug!(namespace, live = stats.live, "Cache ready");
    }
    tracing::info!(backend = ctx.store.backend_name(), "SchoolHub core ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");
    ctx.shutdown().await;
    Ok(())
}

fn resolve_config_path(args: &[String]) -> (String, ConfigSource) {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            if let Some(path) = iter.next() {
                return (path.clone(), ConfigSource::CliArgument);
            }
        } else if let Some(path) = arg.strip_prefix("--config=") {
            return (path.to_string(), ConfigSource::CliArgument);
        }
    }
    if let Ok(path) = env::var("SCHOOLHUB_CONFIG") {
        return (path, ConfigSource::EnvironmentVariable);
    }
    (DEFAULT_CONFIG_FILE.to_string(), ConfigSource::Default)
}
