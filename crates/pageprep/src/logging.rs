//! Logging initialization.
//!
//! Log output goes to stderr; stdout carries the preparation report.
//! `RUST_LOG` overrides the configured level when set.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the subscriber with a default filter directive.
pub fn init(level: &str, json_format: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Initialize logging from the `[logging]` section, with CLI overrides.
pub fn init_from_config(
    config: &pageprep_core::Config,
    verbose_override: bool,
    json_logs_override: bool,
) {
    let level = effective_level(&config.logging.level, verbose_override);
    let json_format = json_logs_override || config.logging.format == "json";
    init(level, json_format);
}

/// `--verbose` raises the level to at least debug.
fn effective_level(configured: &str, verbose: bool) -> &str {
    match (verbose, configured) {
        (_, "trace") => "trace",
        (true, _) => "debug",
        (false, "error" | "warn" | "info" | "debug") => configured,
        (false, other) => {
            eprintln!("Warning: unknown log level {other:?}, using info");
            "info"
        }
    }
}
