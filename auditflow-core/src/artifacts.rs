//! Per-run artifact store.
//!
//! ```text
//! <root>/<run_id>/run.json
//! <root>/<run_id>/scratchpads/<stage_id>.txt
//! <root>/<run_id>/artifacts/<name>.json
//! ```

use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

use crate::error::ArtifactError;
use crate::persistence::{atomic_write, atomic_write_json, load_json, read_text};
use crate::pipeline::types::{RunSnapshot, StageId};

const MANIFEST_FILE: &str = "run.json";
const SCRATCHPAD_DIR: &str = "scratchpads";
const ARTIFACT_DIR: &str = "artifacts";

/// Whether `name` is usable as a file stem: `[A-Za-z0-9_-]+`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Flat file store rooted at the configured outputs directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: Uuid) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    fn scratchpad_path(&self, run_id: Uuid, stage: StageId) -> PathBuf {
        self.run_dir(run_id)
            .join(SCRATCHPAD_DIR)
            .join(format!("{}.txt", stage.as_str()))
    }

    fn artifact_path(&self, run_id: Uuid, name: &str) -> PathBuf {
        self.run_dir(run_id)
            .join(ARTIFACT_DIR)
            .join(format!("{name}.json"))
    }

    /// Persist one stage's log text and its JSON artifact.
    pub async fn write_stage(
        &self,
        run_id: Uuid,
        stage: StageId,
        log_text: &str,
        name: &str,
        payload: &Value,
    ) -> Result<(), ArtifactError> {
        let path = self.scratchpad_path(run_id, stage);
        atomic_write(&path, log_text.as_bytes())
            .await
            .map_err(|e| io_error(&path, e))?;
        self.write_artifact(run_id, name, payload).await
    }

    /// Persist a named JSON artifact.
    pub async fn write_artifact(
        &self,
        run_id: Uuid,
        name: &str,
        payload: &Value,
    ) -> Result<(), ArtifactError> {
        if !is_valid_name(name) {
            return Err(ArtifactError::Io {
                path: self.run_dir(run_id).join(ARTIFACT_DIR),
                message: format!("invalid artifact name '{name}'"),
            });
        }
        let path = self.artifact_path(run_id, name);
        atomic_write_json(&path, payload)
            .await
            .map_err(|e| io_error(&path, e))
    }

    /// The log text a stage produced.
    pub async fn read_scratchpad(
        &self,
        run_id: Uuid,
        stage: StageId,
    ) -> Result<String, ArtifactError> {
        let path = self.scratchpad_path(run_id, stage);
        read_text(&path)
            .await
            .map_err(|e| io_error(&path, e))?
            .ok_or_else(|| ArtifactError::NotFound {
                run_id: run_id.to_string(),
                kind: "Scratchpad",
                name: stage.to_string(),
            })
    }

    /// The stored artifact bytes, exactly as written.
    pub async fn read_artifact_raw(
        &self,
        run_id: Uuid,
        name: &str,
    ) -> Result<String, ArtifactError> {
        let not_found = || ArtifactError::NotFound {
            run_id: run_id.to_string(),
            kind: "Artifact",
            name: name.to_string(),
        };
        if !is_valid_name(name) {
            return Err(not_found());
        }
        let path = self.artifact_path(run_id, name);
        read_text(&path)
            .await
            .map_err(|e| io_error(&path, e))?
            .ok_or_else(not_found)
    }

    pub async fn read_artifact(&self, run_id: Uuid, name: &str) -> Result<Value, ArtifactError> {
        let raw = self.read_artifact_raw(run_id, name).await?;
        serde_json::from_str(&raw).map_err(|e| ArtifactError::Corrupt {
            path: self.artifact_path(run_id, name),
            message: e.to_string(),
        })
    }

    pub async fn write_manifest(&self, run: &RunSnapshot) -> Result<(), ArtifactError> {
        let path = self.run_dir(run.run_id).join(MANIFEST_FILE);
        atomic_write_json(&path, run)
            .await
            .map_err(|e| io_error(&path, e))
    }

    /// Every readable run manifest under the root.
    ///
    /// Directories without a manifest are skipped; unreadable manifests are
    /// logged and skipped.
    pub async fn load_manifests(&self) -> Result<Vec<RunSnapshot>, ArtifactError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.root, e)),
        };

        let mut runs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.root, e))?
        {
            let path = entry.path().join(MANIFEST_FILE);
            match load_json::<RunSnapshot>(&path).await {
                Ok(Some(run)) => runs.push(run),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable run manifest")
                }
            }
        }
        runs.sort_by_key(|r| r.created_at);
        Ok(runs)
    }
}

fn io_error(path: &Path, err: std::io::Error) -> ArtifactError {
    ArtifactError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
