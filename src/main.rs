use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use bracket_trader::config::Config;
use bracket_trader::supervisor;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory holding the CSV configuration files
    #[arg(short, long, default_value = "config")]
    config_dir: PathBuf,
}

fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bracket_trader=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let config = match Config::load(&args.config_dir) {
        Ok(config) => config,
        Err(e) => {
            error!(config_dir = %args.config_dir.display(), "configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        mode = %config.mode,
        symbol = %config.symbol,
        "configuration loaded from {}",
        args.config_dir.display()
    );

    match supervisor::run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}
