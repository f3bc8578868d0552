//! Startup wiring and lifecycle supervision.
//!
//! Builds the shared managers, installs the Ctrl-C handler, spawns the five
//! worker threads, and joins them on shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::account::AccountManager;
use crate::api::ApiManager;
use crate::config::Config;
use crate::connectivity::ConnectivityManager;
use crate::logging::LoggingContext;
use crate::state::SharedState;
use crate::workers::{
    account_worker, gate_worker, logger_worker, market_worker, trader_worker, WorkerContext,
};

pub fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let state = Arc::new(SharedState::new());
    let connectivity = Arc::new(ConnectivityManager::new(config.connectivity.clone()));
    let api = Arc::new(
        ApiManager::new(&config, connectivity).context("building provider clients")?,
    );
    let accounts = Arc::new(AccountManager::new(&config.symbol));
    let logs = Arc::new(LoggingContext::new(&config.logging).context("creating run directory")?);

    info!(
        mode = %config.mode,
        symbol = %config.symbol,
        run_dir = %logs.run_dir().display(),
        "starting trading session"
    );
    logs.log(&format!(
        "session start: {} {} (logs in {})",
        config.mode,
        config.symbol,
        logs.run_dir().display()
    ));

    {
        let state = state.clone();
        ctrlc::set_handler(move || {
            // First signal requests a cooperative shutdown; workers notice
            // via the run flag and the condvar wakeup.
            state.request_shutdown();
        })
        .context("installing signal handler")?;
    }

    let ctx = WorkerContext {
        config: config.clone(),
        state: state.clone(),
        api,
        accounts,
        logs: logs.clone(),
    };

    let workers: Vec<(&str, fn(WorkerContext))> = vec![
        ("gate", gate_worker),
        ("market", market_worker),
        ("account", account_worker),
        ("trader", trader_worker),
        ("logger", logger_worker),
    ];

    let mut handles = Vec::with_capacity(workers.len());
    for (name, body) in workers {
        let ctx = ctx.clone();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(ctx))
            .with_context(|| format!("spawning {name} worker"))?;
        handles.push((name, handle));
    }

    for (name, handle) in handles {
        if handle.join().is_err() {
            error!(worker = name, "worker thread terminated abnormally");
        }
    }

    logs.console().clear_inline();
    info!("all workers joined, session closed");
    Ok(())
}
