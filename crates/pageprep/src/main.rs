//! PagePrep CLI - prepare captured document pages for the crop screen.
//!
//! Decodes a captured page, checks it for blur, scales it to fit a display
//! area and reports the result as JSON. The preparation runs as a
//! cancellable background task, the same way an app would drive it.
//!
//! # Usage
//!
//! ```bash
//! # Prepare a page for an 800x600 display area
//! pageprep prepare page.jpg --width 800 --height 600
//!
//! # Keep the display and blur diagnostic images
//! pageprep prepare page.jpg --width 1080 --height 1920 --write-images
//!
//! # Simulate the user leaving the screen after 20ms
//! pageprep prepare page.jpg --width 800 --height 600 --cancel-after-ms 20
//!
//! # View configuration
//! pageprep config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// PagePrep - crop preparation for captured document pages.
#[derive(Parser, Debug)]
#[command(name = "pageprep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a page for blur and scale it for display
    Prepare(cli::prepare::PrepareArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config = match pageprep_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `pageprep config path`."
            );
            pageprep_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("PagePrep v{}", pageprep_core::VERSION);

    match cli.command {
        Commands::Prepare(args) => cli::prepare::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args, config).await,
    }
}
