//! scn-extract - split a Leica SCN400F slide into per-channel planes.
//!
//! This binary parses arguments, sets up logging and maps pipeline errors
//! onto process exit codes.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scn_extract::config::{Config, ListFormat};
use scn_extract::extract;

/// Exit code for bad arguments or invalid configuration.
const EXIT_USAGE: u8 = 64;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config = match Config::try_parse() {
        Ok(config) => config,
        Err(e) => {
            // --help and --version are reported through the error path too
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::from(EXIT_USAGE);
    }

    if config.list {
        run_list(&config).await
    } else {
        run_extract(&config).await
    }
}

// =============================================================================
// Extract
// =============================================================================

async fn run_extract(config: &Config) -> ExitCode {
    info!(
        input = %config.input.display(),
        prefix = %config.output_prefix.display(),
        strict = config.strict,
        "scn-extract v{}",
        env!("CARGO_PKG_VERSION")
    );

    match extract::run(&config.extract_options()).await {
        Ok(report) => {
            if report.planes_written() == 0 {
                info!("No planes selected for extraction");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

// =============================================================================
// List
// =============================================================================

async fn run_list(config: &Config) -> ExitCode {
    let selection = match extract::inspect(&config.extract_options()).await {
        Ok(selection) => selection,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    match config.list_format {
        ListFormat::Text => print!("{}", selection),
        ListFormat::Json => match serde_json::to_string_pretty(&selection) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Could not serialize selection: {}", e);
                return ExitCode::FAILURE;
            }
        },
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "scn_extract=debug"
    } else {
        "scn_extract=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
