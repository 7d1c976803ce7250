//! Auditflow CLI: serve the audit API or run a single audit from the terminal.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Auditflow: HR audit pipeline engine
#[derive(Parser, Debug)]
#[command(name = "auditflow", version, about, long_about = None)]
struct Cli {
    /// Workspace directory; relative dataset and output paths resolve against it
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Employee dataset (CSV with header row)
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,

    /// Root directory for per-run outputs
    #[arg(long, global = true)]
    outputs: Option<PathBuf>,

    /// Simulated latency per stage checkpoint, in milliseconds
    #[arg(long, global = true)]
    stage_delay_ms: Option<u64>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Address to bind (overrides server.host)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one audit to completion and print the findings
    Run {
        /// Audit identifier
        #[arg(long)]
        audit_id: String,
        /// Human-readable audit name
        #[arg(long)]
        audit_name: String,
        /// Print the final run status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Create a default configuration file in the workspace
    Init,
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = auditflow_core::config::default_log_dir().unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "auditflow.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let overrides = auditflow_core::ConfigOverrides {
        dataset_path: cli.dataset,
        outputs_dir: cli.outputs,
        stage_delay_ms: cli.stage_delay_ms,
        ..Default::default()
    };

    commands::handle_command(cli.command, &workspace, overrides).await
}
