//! The `pageprep config` command for configuration management.

use clap::{Args, Subcommand};
use pageprep_core::Config;
use std::path::Path;

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,

    /// Show config file path
    Path,

    /// Initialize a new config file with defaults
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

/// Execute the config command against the already loaded configuration.
pub async fn execute(args: ConfigArgs, config: Config) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            println!("{}", config.to_toml()?);
        }

        ConfigCommand::Path => {
            println!("{}", Config::default_path().display());
        }

        ConfigCommand::Init { force } => {
            let path = Config::default_path();
            init_at(&path, force)?;
            tracing::info!("Config file created at: {}", path.display());
            println!("Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

/// Write the default configuration to `path`, refusing to clobber unless `force`.
fn init_at(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, Config::default().to_toml()?)?;
    Ok(())
}
