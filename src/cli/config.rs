//! `config` subcommand handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::Path;

use crate::config::ConfigLoader;

/// Configuration management subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigSubcommand {
    /// Show configuration file path
    Path,
    /// Print the effective configuration as YAML
    Show,
    /// Validate configuration
    Validate,
}

/// Handle configuration subcommands
pub fn handle_config_command(cmd: ConfigSubcommand, config_path: Option<&Path>) -> Result<()> {
    match cmd {
        ConfigSubcommand::Path => {
            println!("{}", ConfigLoader::config_path(config_path).display());
        }
        ConfigSubcommand::Show => {
            let config = ConfigLoader::load(config_path).context("Failed to load configuration")?;
            let yaml =
                serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
            print!("{}", yaml);
        }
        ConfigSubcommand::Validate => {
            let config = ConfigLoader::load(config_path).context("Failed to load configuration")?;
            ConfigLoader::validate(&config).context("Configuration validation failed")?;
            println!("Configuration is valid");
        }
    }

    Ok(())
}
