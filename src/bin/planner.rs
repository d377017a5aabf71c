//! Planner process entry point

use clap::Parser;
use eyre::{Context, Result};
use std::sync::Arc;
use tracing::info;

use deskpilot::broker::{FsBroker, MessageBus};
use deskpilot::cli::{PlannerCli, setup_logging};
use deskpilot::config::Config;
use deskpilot::llm::create_client;
use deskpilot::planner::{PlannerSession, StdinConfirmer, spawn_input_reader};
use deskpilot::vision::{ConfirmationPrompt, DenyAllPrompt, VisionNavigator};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = PlannerCli::parse();
    setup_logging("planner", cli.log_level.as_deref()).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(root) = cli.broker_root {
        config.broker.root_dir = root;
    }

    let bus: Arc<dyn MessageBus> = Arc::new(
        FsBroker::new(&config.broker.root_dir, config.broker.poll_interval_ms).context("Failed to open broker")?,
    );
    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    let input = spawn_input_reader();

    // Unattended runs have no interactive channel: critical actions are
    // denied, which aborts the vision loop instead of asking.
    let confirmer: Arc<dyn ConfirmationPrompt> = if cli.unattended {
        Arc::new(DenyAllPrompt)
    } else {
        Arc::new(StdinConfirmer::new(input.clone()))
    };
    let navigator = VisionNavigator::new(bus.clone(), llm.clone(), config.vision.clone(), &config.planner)
        .with_confirmer(confirmer);

    let mut session = PlannerSession::new(config, bus, llm, navigator, input);

    let control = session.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("SIGINT received, stopping planner");
            control.stop();
        }
    });

    session.run().await.context("Planner session failed")?;
    Ok(())
}
