//! End-to-end runs of the five-stage audit pipeline against a CSV fixture.

use auditflow_core::artifacts::ArtifactStore;
use auditflow_core::error::ArtifactError;
use auditflow_core::dataset::CsvDatasetSource;
use auditflow_core::pipeline::{PipelineExecutor, RunRegistry, RunStatus, StageId, StageStatus};
use auditflow_core::reporter::StatusReporter;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("hr_audit.csv")
}

fn executor(dir: &TempDir, dataset: PathBuf) -> PipelineExecutor {
    PipelineExecutor::with_source(
        RunRegistry::new(),
        ArtifactStore::new(dir.path().join("outputs")),
        Arc::new(CsvDatasetSource::new(dataset)),
        Duration::ZERO,
    )
}

#[tokio::test]
async fn test_full_audit_of_fixture() {
    let dir = TempDir::new().unwrap();
    let executor = executor(&dir, fixture());
    let (run, handle) = executor.submit("HR-2024-Q4", "Quarterly HR audit").await;
    handle.await.unwrap();

    let run = executor.registry().get(run.run_id).await.unwrap();
    assert_eq!(run.status(), RunStatus::Completed);
    for stage in &run.stages {
        assert_eq!(stage.status, StageStatus::Completed);
        assert_eq!(stage.progress, 100);
        assert!(stage.timestamp.is_some());
    }

    let artifacts = executor.artifacts();
    let integrator = artifacts
        .read_artifact(run.run_id, "data_integrator_output")
        .await
        .unwrap();
    assert_eq!(integrator["rows"], 56);
    assert_eq!(integrator["unique_emp_ids"], 46);

    let normalized = artifacts
        .read_artifact(run.run_id, "normalized_snapshot")
        .await
        .unwrap();
    assert_eq!(normalized["rows"], 56);
    assert_eq!(normalized["conversion_errors"]["bonus"], 0);

    let rules = artifacts.read_artifact(run.run_id, "rules_results").await.unwrap();
    assert_eq!(rules["normalized_row_count"], 56);
    assert_eq!(rules["duplicates_removed"], 10);
    assert_eq!(rules["final_row_count"], 46);
    assert_eq!(rules["duplicate_groups"].as_array().unwrap().len(), 5);
    assert_eq!(
        rules["mismatch_counts"],
        serde_json::json!({"position": 4, "bonus": 3, "paygrade": 2})
    );
    assert_eq!(
        rules["job_allocation_issues"],
        serde_json::json!(["E010", "E011", "E012"])
    );
    assert_eq!(rules["investigation_rollup"]["past_cleared"], 14);
    assert_eq!(rules["investigation_rollup"]["past_flagged"], 16);
    assert_eq!(rules["investigation_rollup"]["ongoing"], 14);
    assert_eq!(rules["investigation_rollup"]["missing"], 1);
    assert_eq!(rules["investigation_rollup"]["unrecognized"], 1);
    assert_eq!(rules["sample_final_data"].as_array().unwrap().len(), 5);
    // 9 mismatch alerts plus 3 job allocation alerts.
    assert_eq!(rules["alerts"].as_array().unwrap().len(), 12);

    let policy = artifacts.read_artifact(run.run_id, "policy_results").await.unwrap();
    let violators: Vec<&str> = policy["violations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["emp_id"].as_str().unwrap())
        .collect();
    assert_eq!(
        violators,
        vec!["E020", "E021", "E022", "E023", "E024", "E025", "E026"]
    );
    assert_eq!(policy["checked"], 46);

    let summary = artifacts.read_artifact(run.run_id, "summary").await.unwrap();
    let findings = &summary["findings"];
    assert_eq!(findings["duplicates_removed"], 10);
    assert_eq!(findings["final_row_count"], 46);
    assert_eq!(findings["policy_violations"], 7);
    assert_eq!(findings["job_allocation_issues"], 3);
    assert_eq!(findings["total_issues"], 10 + 9 + 3 + 7);
    assert!(!summary["risks"].as_array().unwrap().is_empty());

    let report = artifacts.read_artifact(run.run_id, "audit_report").await.unwrap();
    assert_eq!(report["audit_id"], "HR-2024-Q4");
    assert_eq!(report["run_id"], run.run_id.to_string());
    assert_eq!(report["summary"], summary);
}

#[tokio::test]
async fn test_scratchpads_written_for_every_stage() {
    let dir = TempDir::new().unwrap();
    let executor = executor(&dir, fixture());
    let (run, handle) = executor.submit("HR-1", "Scratchpads").await;
    handle.await.unwrap();

    for stage in StageId::ALL {
        let text = executor
            .artifacts()
            .read_scratchpad(run.run_id, stage)
            .await
            .unwrap();
        assert!(!text.is_empty(), "empty scratchpad for {stage}");
    }
    let rules = executor
        .artifacts()
        .read_scratchpad(run.run_id, StageId::RulesEngine)
        .await
        .unwrap();
    assert!(rules.contains("Duplicates removed: 10"));
    assert!(rules.contains("Mismatches: position=4 bonus=3 paygrade=2"));
}

#[tokio::test]
async fn test_missing_dataset_fails_first_stage() {
    let dir = TempDir::new().unwrap();
    let executor = executor(&dir, dir.path().join("does-not-exist.csv"));
    let (run, handle) = executor.submit("HR-404", "No data").await;
    handle.await.unwrap();

    let run = executor.registry().get(run.run_id).await.unwrap();
    assert_eq!(run.status(), RunStatus::Error);
    let first = &run.stages[0];
    assert_eq!(first.stage_id, StageId::DataIntegrator);
    assert_eq!(first.status, StageStatus::Error);
    assert!(first
        .error_message
        .as_deref()
        .unwrap()
        .contains("does-not-exist.csv"));
    assert!(run.stages[1..]
        .iter()
        .all(|s| s.status == StageStatus::Pending && s.progress == 0));

    let reporter = StatusReporter::new(executor.registry().clone(), executor.artifacts().clone());
    let err = reporter
        .scratchpad(&run.run_id.to_string(), "normalizer")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_missing_columns_fail_first_stage() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.csv");
    std::fs::write(&path, "emp_id,emp_name\nE1,Ann\n").unwrap();
    let executor = executor(&dir, path);
    let (run, handle) = executor.submit("HR-COLS", "Bad header").await;
    handle.await.unwrap();

    let run = executor.registry().get(run.run_id).await.unwrap();
    assert_eq!(run.stages[0].status, StageStatus::Error);
    assert!(run.stages[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("bonus"));
}

#[tokio::test]
async fn test_restore_after_restart() {
    let dir = TempDir::new().unwrap();
    let first = executor(&dir, fixture());
    let (run, handle) = first.submit("HR-R", "Before restart").await;
    handle.await.unwrap();

    // A new process sees the same outputs directory.
    let second = executor(&dir, fixture());
    for snapshot in second.artifacts().load_manifests().await.unwrap() {
        second.registry().restore(snapshot).await.unwrap();
    }
    let restored = second.registry().get(run.run_id).await.unwrap();
    assert_eq!(restored.status(), RunStatus::Completed);
    assert_eq!(restored.audit_name, "Before restart");
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let dir = TempDir::new().unwrap();
    let good = executor(&dir, fixture());
    let bad = PipelineExecutor::with_source(
        good.registry().clone(),
        good.artifacts().clone(),
        Arc::new(CsvDatasetSource::new(dir.path().join("missing.csv"))),
        Duration::ZERO,
    );

    let (ok_run, ok_handle) = good.submit("HR-A", "Good").await;
    let (bad_run, bad_handle) = bad.submit("HR-B", "Bad").await;
    ok_handle.await.unwrap();
    bad_handle.await.unwrap();

    let registry = good.registry();
    assert_eq!(
        registry.get(ok_run.run_id).await.unwrap().status(),
        RunStatus::Completed
    );
    assert_eq!(
        registry.get(bad_run.run_id).await.unwrap().status(),
        RunStatus::Error
    );
    let listed: Vec<_> = registry.list().await.into_iter().map(|r| r.run_id).collect();
    assert_eq!(listed, vec![bad_run.run_id, ok_run.run_id]);
}

fn status_rank(status: StageStatus) -> u8 {
    match status {
        StageStatus::Pending => 0,
        StageStatus::Running => 1,
        StageStatus::Completed | StageStatus::Error => 2,
    }
}

#[tokio::test]
async fn test_reads_while_pipeline_is_running() {
    let dir = TempDir::new().unwrap();
    let executor = PipelineExecutor::with_source(
        RunRegistry::new(),
        ArtifactStore::new(dir.path().join("outputs")),
        Arc::new(CsvDatasetSource::new(fixture())),
        Duration::from_millis(25),
    );
    let (run, handle) = executor.submit("HR-LIVE", "Observed while running").await;
    let registry = executor.registry();
    let artifacts = executor.artifacts();

    let mut observed: Vec<Vec<(StageStatus, u8)>> = vec![Vec::new(); run.stages.len()];
    let mut saw_running = false;
    let mut checked_partial_outputs = false;

    for _ in 0..2_000 {
        let snapshot = registry.get(run.run_id).await.unwrap();
        for (seen, stage) in observed.iter_mut().zip(&snapshot.stages) {
            let point = (stage.status, stage.progress);
            if seen.last() != Some(&point) {
                seen.push(point);
            }
        }
        saw_running |= snapshot.status() == RunStatus::Running;

        let stage = |id: StageId| snapshot.stage(id).map(|s| s.status);
        if !checked_partial_outputs
            && stage(StageId::DataIntegrator) == Some(StageStatus::Completed)
            && stage(StageId::PolicyCheck) == Some(StageStatus::Pending)
        {
            let integrator = artifacts
                .read_artifact(run.run_id, "data_integrator_output")
                .await
                .unwrap();
            assert_eq!(integrator["rows"], 56);

            let pad = artifacts.read_scratchpad(run.run_id, StageId::Summary).await;
            assert!(matches!(pad, Err(ArtifactError::NotFound { .. })));
            let summary = artifacts.read_artifact(run.run_id, "summary").await;
            assert!(matches!(summary, Err(ArtifactError::NotFound { .. })));
            checked_partial_outputs = true;
        }

        if snapshot.status() == RunStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    handle.await.unwrap();

    assert!(saw_running);
    assert!(checked_partial_outputs);
    for (seen, stage) in observed.iter().zip(&run.stages) {
        for pair in seen.windows(2) {
            let ((from, from_progress), (to, to_progress)) = (pair[0], pair[1]);
            assert!(
                status_rank(from) <= status_rank(to),
                "{}: {from} -> {to}",
                stage.stage_id
            );
            assert!(from_progress <= to_progress, "{}: progress went back", stage.stage_id);
        }
        assert_eq!(seen.last(), Some(&(StageStatus::Completed, 100)));
    }
}
