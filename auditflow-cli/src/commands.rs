//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use auditflow_core::config::{AuditConfig, ConfigOverrides, load_config, workspace_config_path};
use auditflow_core::server::{self, AppState};
use auditflow_core::{
    ArtifactStore, CsvDatasetSource, PipelineExecutor, RunRegistry, RunSnapshot, RunStatus,
    RunStatusView,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    mut overrides: ConfigOverrides,
) -> anyhow::Result<()> {
    match command {
        Commands::Serve { host, port } => {
            overrides.host = host;
            overrides.port = port;
            let config = effective_config(workspace, &overrides)?;
            handle_serve(config).await
        }
        Commands::Run {
            audit_id,
            audit_name,
            json,
        } => {
            let config = effective_config(workspace, &overrides)?;
            let run = handle_run(&config, &audit_id, &audit_name).await?;
            print_run(&config, &run, json).await?;
            if run.status() == RunStatus::Error {
                anyhow::bail!(
                    "Audit run {} failed: {}",
                    run.run_id,
                    run.error_message().unwrap_or("unknown error")
                );
            }
            Ok(())
        }
        Commands::Config { action } => handle_config(action, workspace, &overrides),
    }
}

/// Load, validate, and anchor the configuration to the workspace.
fn effective_config(
    workspace: &Path,
    overrides: &ConfigOverrides,
) -> anyhow::Result<AuditConfig> {
    let mut config = load_config(Some(workspace), Some(overrides))
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    config.ensure_valid()?;
    config.resolve_paths(workspace);
    Ok(config)
}

fn build_executor(config: &AuditConfig, registry: RunRegistry) -> PipelineExecutor {
    PipelineExecutor::with_source(
        registry,
        ArtifactStore::new(&config.storage.outputs_dir),
        Arc::new(CsvDatasetSource::new(&config.dataset.path)),
        config.pipeline.stage_delay(),
    )
}

async fn handle_serve(config: AuditConfig) -> anyhow::Result<()> {
    let executor = build_executor(&config, RunRegistry::new());
    let restored = restore_runs(&executor).await?;
    info!(
        restored,
        outputs_dir = %config.storage.outputs_dir.display(),
        dataset = %config.dataset.path.display(),
        "Restored previous runs"
    );

    server::run(AppState::new(executor), &config.server.bind_addr()).await?;
    Ok(())
}

/// Re-register every run found under the outputs directory.
///
/// Runs that were cut off mid-pipeline come back as errors; their manifests
/// are rewritten so the files agree with the registry.
async fn restore_runs(executor: &PipelineExecutor) -> anyhow::Result<usize> {
    let mut restored = 0;
    for snapshot in executor.artifacts().load_manifests().await? {
        let run_id = snapshot.run_id;
        let closed = match executor.registry().restore(snapshot.clone()).await {
            Ok(run) => run,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Skipping run manifest");
                continue;
            }
        };
        if closed != snapshot {
            info!(run_id = %run_id, "Closed out interrupted run");
            if let Err(e) = executor.artifacts().write_manifest(&closed).await {
                warn!(run_id = %run_id, error = %e, "Failed to rewrite run manifest");
            }
        }
        restored += 1;
    }
    Ok(restored)
}

/// Run one audit in-process and wait for it to finish.
async fn handle_run(
    config: &AuditConfig,
    audit_id: &str,
    audit_name: &str,
) -> anyhow::Result<RunSnapshot> {
    let executor = build_executor(config, RunRegistry::new());
    let (run, handle) = executor.submit(audit_id, audit_name).await;
    handle.await?;
    Ok(executor.registry().get(run.run_id).await?)
}

async fn print_run(config: &AuditConfig, run: &RunSnapshot, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&RunStatusView::from(run))?);
        return Ok(());
    }

    println!("Run {} ({}: {})", run.run_id, run.audit_id, run.audit_name);
    for stage in &run.stages {
        match &stage.error_message {
            Some(message) => {
                println!("  {:<16} {:<10} {}", stage.stage_id, stage.status, message)
            }
            None => println!(
                "  {:<16} {:<10} {:>3}%",
                stage.stage_id, stage.status, stage.progress
            ),
        }
    }

    if run.status() == RunStatus::Completed {
        let store = ArtifactStore::new(&config.storage.outputs_dir);
        let summary = store.read_artifact(run.run_id, "summary").await?;
        let findings = &summary["findings"];
        println!();
        println!("  Duplicates removed:   {}", findings["duplicates_removed"]);
        println!("  Final rows:           {}", findings["final_row_count"]);
        println!(
            "  Mismatches:           position={} bonus={} paygrade={}",
            findings["mismatch_counts"]["position"],
            findings["mismatch_counts"]["bonus"],
            findings["mismatch_counts"]["paygrade"]
        );
        println!("  Job allocation gaps:  {}", findings["job_allocation_issues"]);
        println!("  Policy violations:    {}", findings["policy_violations"]);
        println!("  Total issues:         {}", findings["total_issues"]);
        println!();
        println!("  Outputs: {}", store.run_dir(run.run_id).display());
    }
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    overrides: &ConfigOverrides,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }

            let toml_str = toml::to_string_pretty(&AuditConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(Some(workspace), Some(overrides))
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
