//! Configuration management commands.

use std::path::{Path, PathBuf};

use clap::Args;
use shardkeep_core::config::Config;
use shardkeep_core::paths;

/// Config command arguments.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(clap::Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,

    /// Get a configuration value
    Get {
        /// Configuration key (dot-separated path, e.g. `sharing.threshold`)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,

        /// Value to set (parsed as JSON, falling back to a string)
        value: String,
    },

    /// Write a default configuration file
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Show configuration file path
    Path,

    /// Validate configuration
    Validate,
}

fn config_path(override_path: Option<&Path>) -> anyhow::Result<PathBuf> {
    match override_path {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(paths::config_file()?),
    }
}

fn load(path: &Path) -> anyhow::Result<Config> {
    match Config::load(path) {
        Ok(config) => Ok(config),
        Err(shardkeep_core::ConfigError::NotFound(_)) => Ok(Config::default()),
        Err(e) => anyhow::bail!("Failed to load config: {}", e),
    }
}

/// Walk a dot-separated key path.
fn get_path<'a>(json: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
    key.split('.').try_fold(json, |acc, k| acc.get(k))
}

/// Set a dot-separated key path, creating intermediate objects as needed.
/// The value is parsed as JSON first (numbers, bools, null), falling back
/// to a plain string.
fn set_path(json: &mut serde_json::Value, key: &str, value: &str) {
    let parsed: serde_json::Value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));

    let parts: Vec<&str> = key.split('.').collect();
    let mut current = json;
    for (i, part) in parts.iter().enumerate() {
        if i == parts.len() - 1 {
            current[part] = parsed;
            return;
        }
        if !current.get(part).map_or(false, |v| v.is_object()) {
            current[part] = serde_json::json!({});
        }
        current = &mut current[part];
    }
}

/// Run the config command.
pub fn run(args: ConfigArgs, override_path: Option<&Path>) -> anyhow::Result<()> {
    let path = config_path(override_path)?;

    match args.command {
        ConfigCommand::Show => {
            let config = load(&path)?;
            println!("{}", config.to_json5()?);
        }

        ConfigCommand::Get { key } => {
            let json = serde_json::to_value(load(&path)?)?;
            match get_path(&json, &key) {
                Some(v) => println!("{}", serde_json::to_string_pretty(v)?),
                None => anyhow::bail!("Key not found: {}", key),
            }
        }

        ConfigCommand::Set { key, value } => {
            let mut json = serde_json::to_value(load(&path)?)?;
            set_path(&mut json, &key, &value);

            let updated: Config = serde_json::from_value(json)
                .map_err(|e| anyhow::anyhow!("Invalid configuration after set: {}", e))?;
            updated
                .validate()
                .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
            updated.save(&path)?;

            println!("Set {} = {}", key, value);
        }

        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists: {:?}. Use --force to overwrite.",
                    path
                );
            }
            Config::default().save(&path)?;
            println!("Created config file: {:?}", path);
        }

        ConfigCommand::Path => {
            println!("{}", path.display());
        }

        ConfigCommand::Validate => match Config::load(&path) {
            Ok(config) => match config.validate() {
                Ok(()) => println!("Configuration is valid"),
                Err(e) => anyhow::bail!("Configuration error: {}", e),
            },
            Err(e) => anyhow::bail!("Failed to load config: {}", e),
        },
    }

    Ok(())
}
