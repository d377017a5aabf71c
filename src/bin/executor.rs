//! Executor process entry point
//!
//! Ships with the logging no-op driver; a deployment provides its real
//! `PlatformDriver` implementation here (the rest of the process is
//! driver-agnostic).

use clap::Parser;
use eyre::{Context, Result};
use std::sync::Arc;
use tracing::info;

use deskpilot::broker::{FsBroker, MessageBus};
use deskpilot::cli::{ExecutorCli, setup_logging};
use deskpilot::config::Config;
use deskpilot::driver::{NullDriver, PlatformDriver};
use deskpilot::executor::ExecutorService;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ExecutorCli::parse();
    setup_logging("executor", cli.log_level.as_deref()).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(root) = cli.broker_root {
        config.broker.root_dir = root;
    }
    if cli.dry_run {
        config.execution.dry_run = true;
    }

    let bus: Arc<dyn MessageBus> = Arc::new(
        FsBroker::new(&config.broker.root_dir, config.broker.poll_interval_ms).context("Failed to open broker")?,
    );
    let driver: Arc<dyn PlatformDriver> = Arc::new(NullDriver::new());

    let service = ExecutorService::new(config, driver, bus);

    let control = service.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("SIGINT received, stopping executor");
            control.stop();
        }
    });

    service.run().await.context("Executor service failed")?;
    Ok(())
}
