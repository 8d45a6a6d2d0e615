//! # Upstream Guard Configuration Tool
//!
//! Validates an upstream-guard configuration directory for an environment and
//! prints the effective circuit breaker and cache TTL tables.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use upstream_guard::cache::providers::redact_url;
use upstream_guard::cache::TtlPolicy;
use upstream_guard::config::ConfigManager;

#[derive(Parser)]
#[command(name = "guard-config")]
#[command(about = "Validate upstream-guard configuration and show effective settings")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to load (defaults to UPSTREAM_GUARD_ENV / APP_ENV / development)
    #[arg(short, long)]
    environment: Option<String>,

    /// Configuration directory (default: $UPSTREAM_GUARD_CONFIG_DIR or ./config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the configuration (default)
    Validate,

    /// Show effective circuit breaker settings per component
    Breakers,

    /// Show effective cache TTL per resource kind
    Ttl,

    /// Dump the merged configuration with secrets masked
    Show,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = load(&cli).and_then(|manager| match &cli.command {
        Some(Commands::Validate) | None => validate(&cli, &manager),
        Some(Commands::Breakers) => show_breakers(&cli, &manager),
        Some(Commands::Ttl) => show_ttl(&cli, &manager),
        Some(Commands::Show) => show_config(&manager),
    });

    match result {
        Ok(()) => {
            info!("guard-config completed successfully");
        }
        Err(e) => {
            error!("guard-config failed: {e:#}");
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> anyhow::Result<Arc<ConfigManager>> {
    let environment = cli
        .environment
        .clone()
        .unwrap_or_else(ConfigManager::detect_environment);

    ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &environment)
        .with_context(|| format!("failed to load configuration for environment '{environment}'"))
}

fn validate(cli: &Cli, manager: &ConfigManager) -> anyhow::Result<()> {
    let config = manager.config();

    match cli.format {
        OutputFormat::Json => {
            let report = json!({
                "valid": true,
                "environment": manager.environment(),
                "config_directory": manager.config_directory(),
                "loaded_files": manager.loaded_files(),
                "cache_backend": config.cache.backend,
                "circuit_breakers_enabled": config.circuit_breakers.enabled,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => {
            println!("Configuration valid");
            println!("  environment:      {}", manager.environment());
            println!("  directory:        {}", manager.config_directory().display());
            if manager.loaded_files().is_empty() {
                println!("  files:            (none, defaults and environment only)");
            }
            for file in manager.loaded_files() {
                println!("  file:             {}", file.display());
            }
            println!("  cache backend:    {}", config.cache.backend);
            if config.cache.backend_kind()? == upstream_guard::config::CacheBackendKind::Redis {
                println!("  redis url:        {}", redact_url(&config.cache.redis.url));
            }
            let breakers = if config.circuit_breakers.enabled {
                "enabled"
            } else {
                "disabled"
            };
            println!("  circuit breakers: {breakers}");
            println!(
                "  retry:            {} attempts, {:?} backoff",
                config.retry.max_attempts, config.retry.backoff
            );
        }
    }
    Ok(())
}

fn show_breakers(cli: &Cli, manager: &ConfigManager) -> anyhow::Result<()> {
    let settings = &manager.config().circuit_breakers;
    let mut names: Vec<&String> = settings.component_configs.keys().collect();
    names.sort();

    match cli.format {
        OutputFormat::Json => {
            let rows: serde_json::Map<String, serde_json::Value> = names
                .iter()
                .map(|name| -> anyhow::Result<(String, serde_json::Value)> {
                    let component = settings.config_for_component(name);
                    Ok(((*name).clone(), serde_json::to_value(component)?))
                })
                .collect::<anyhow::Result<_>>()?;
            let report = json!({
                "enabled": settings.enabled,
                "default": settings.default_config,
                "components": rows,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => {
            println!(
                "{:<20} {:>9} {:>9} {:>10} {:>12}",
                "COMPONENT", "FAILURES", "SUCCESSES", "RESET (s)", "TIMEOUT (s)"
            );
            let default_row = ("(default)".to_string(), settings.default_config.clone());
            let rows = names
                .iter()
                .map(|name| ((*name).clone(), settings.config_for_component(name)))
                .chain(std::iter::once(default_row));
            for (name, c) in rows {
                println!(
                    "{:<20} {:>9} {:>9} {:>10} {:>12}",
                    name,
                    c.failure_threshold,
                    c.success_threshold,
                    c.reset_timeout_seconds,
                    c.request_timeout_seconds
                );
            }
            if !settings.enabled {
                println!("\nCircuit breakers are disabled");
            }
        }
    }
    Ok(())
}

fn show_ttl(cli: &Cli, manager: &ConfigManager) -> anyhow::Result<()> {
    let policy = TtlPolicy::from_config(&manager.config().cache);
    let entries = policy.entries();

    match cli.format {
        OutputFormat::Json => {
            let rows: serde_json::Map<String, serde_json::Value> = entries
                .iter()
                .map(|(kind, ttl)| (kind.to_string(), json!(ttl.as_secs())))
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Table => {
            println!("{:<18} {:<12} {:>8}", "RESOURCE", "DOMAIN", "TTL (s)");
            for (kind, ttl) in entries {
                println!("{:<18} {:<12} {:>8}", kind.as_str(), kind.domain(), ttl.as_secs());
            }
        }
    }
    Ok(())
}

fn show_config(manager: &ConfigManager) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
    Ok(())
}
