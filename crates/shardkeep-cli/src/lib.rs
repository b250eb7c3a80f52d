//! shardkeep command-line interface.

pub mod commands;

use std::path::Path;

use clap::{Parser, Subcommand};
use shardkeep_core::config::{Config, LogLevel};
use shardkeep_core::ConfigError;
use shardkeep_core::env::{self, vars};

/// shardkeep - threshold key splitting and share storage
#[derive(Parser)]
#[command(name = "shardkeep")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, env = "SHARDKEEP_CONFIG")]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Split a hex secret read from stdin into shares
    Split(commands::shares::SplitArgs),

    /// Reconstruct a secret from hex shares
    Combine(commands::shares::CombineArgs),

    /// Derive a hardened key from a hex secret read from stdin
    Derive(commands::derive::DeriveArgs),

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Store and recover a secret with one backend offline
    Demo(commands::demo::DemoArgs),

    /// Show version information
    Version,
}

/// Load the config at `path` (or the default location), falling back to
/// defaults when the file does not exist.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let loaded = match path {
        Some(path) => Config::load(path),
        None => Config::load_default(),
    };
    match loaded {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound(_)) => Ok(Config::default()),
        Err(e) => Err(anyhow::anyhow!("Failed to load config: {}", e)),
    }
}

/// Default tracing filter when `RUST_LOG` is unset.
///
/// `SHARDKEEP_LOG` wins over the configured level; each `-v` raises the
/// configured level by one step.
pub fn log_filter(config: &Config, verbose: u8) -> String {
    if let Some(filter) = env::get_var(vars::SHARDKEEP_LOG) {
        return filter;
    }
    let level = match (config.logging.level, verbose) {
        (level, 0) => level,
        (LogLevel::Error, 1) => LogLevel::Warn,
        (LogLevel::Error, 2) | (LogLevel::Warn, 1) => LogLevel::Info,
        (LogLevel::Error, 3) | (LogLevel::Warn, 2) | (LogLevel::Info, 1) => LogLevel::Debug,
        _ => LogLevel::Trace,
    };
    format!("shardkeep={}", level.as_str())
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    match cli.command {
        Commands::Split(args) => commands::shares::split(args, &config),
        Commands::Combine(args) => commands::shares::combine(args, &config),
        Commands::Derive(args) => commands::derive::run(args, &config).await,
        Commands::Config(args) => commands::config::run(args, cli.config.as_deref()),
        Commands::Demo(args) => commands::demo::run(args, &config).await,
        Commands::Version => {
            println!("shardkeep {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
