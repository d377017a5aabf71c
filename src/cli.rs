//! CLI argument definitions and logging setup for the two binaries

use clap::Parser;
use eyre::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Planner - interactive natural-language front end
#[derive(Debug, Parser)]
#[command(
    name = "planner",
    about = "DeskPilot planner: turns commands into protocols and drives vision loops",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct PlannerCli {
    /// Path to config file
    #[arg(short, long, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)")]
    pub log_level: Option<String>,

    /// Override the broker root directory
    #[arg(long = "broker-root", help = "Broker root directory shared with the executor")]
    pub broker_root: Option<PathBuf>,

    /// No interactive prompts; critical vision actions are denied
    #[arg(long, help = "Run without interactive prompts (critical actions are denied)")]
    pub unattended: bool,
}

/// Executor - protocol runner against the host OS
#[derive(Debug, Parser)]
#[command(
    name = "executor",
    about = "DeskPilot executor: runs protocols from the broker against the platform driver",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct ExecutorCli {
    /// Path to config file
    #[arg(short, long, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)")]
    pub log_level: Option<String>,

    /// Override the broker root directory
    #[arg(long = "broker-root", help = "Broker root directory shared with the planner")]
    pub broker_root: Option<PathBuf>,

    /// Log every action instead of touching the OS
    #[arg(long = "dry-run", help = "Substitute and log actions without driving the OS")]
    pub dry_run: bool,
}

/// Set up file-based tracing for one component.
///
/// Interactive output stays on the terminal; diagnostics go to
/// `<data-local>/deskpilot/logs/<component>.log`. Level priority:
/// CLI flag > RUST_LOG > INFO.
pub fn setup_logging(component: &str, cli_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deskpilot")
        .join("logs");
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = match cli_log_level.map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let log_file =
        fs::File::create(log_dir.join(format!("{}.log", component))).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!(component, ?level, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planner_cli_parses() {
        let cli = PlannerCli::parse_from(["planner", "--unattended", "--broker-root", "/tmp/mb"]);
        assert!(cli.unattended);
        assert_eq!(cli.broker_root, Some(PathBuf::from("/tmp/mb")));
    }

    #[test]
    fn test_executor_cli_parses() {
        let cli = ExecutorCli::parse_from(["executor", "--dry-run", "-l", "debug"]);
        assert!(cli.dry_run);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
