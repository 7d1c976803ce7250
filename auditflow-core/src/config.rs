//! Configuration system for Auditflow.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> CLI overrides. Configuration is
//! loaded from `~/.config/auditflow/config.toml` and/or
//! `.auditflow/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    pub dataset: DatasetConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

/// Where the employee table is read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// CSV file with a header row.
    pub path: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("HR_Audit_FlatTable.csv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Simulated latency before each progress checkpoint, in milliseconds.
    pub stage_delay_ms: u64,
}

impl PipelineConfig {
    pub fn stage_delay(&self) -> Duration {
        Duration::from_millis(self.stage_delay_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the per-run output tree.
    pub outputs_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            outputs_dir: PathBuf::from("outputs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl AuditConfig {
    /// Validate the configuration, returning any problems found.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.dataset.path.as_os_str().is_empty() {
            problems.push("dataset.path must not be empty".to_string());
        }
        if self.storage.outputs_dir.as_os_str().is_empty() {
            problems.push("storage.outputs_dir must not be empty".to_string());
        }
        if self.server.host.trim().is_empty() {
            problems.push("server.host must not be empty".to_string());
        }
        if self.pipeline.stage_delay_ms > 60_000 {
            problems.push(format!(
                "pipeline.stage_delay_ms must be at most 60000, got {}",
                self.pipeline.stage_delay_ms
            ));
        }
        problems
    }

    /// Like [`validate`](Self::validate), but as a single error.
    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        let problems = self.validate();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                message: problems.join("; "),
            })
        }
    }

    /// Resolve relative dataset and output paths against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.dataset.path.is_relative() {
            self.dataset.path = base.join(&self.dataset.path);
        }
        if self.storage.outputs_dir.is_relative() {
            self.storage.outputs_dir = base.join(&self.storage.outputs_dir);
        }
    }
}

/// Values set explicitly on the command line. Unset fields leave the lower
/// layers untouched.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub dataset_path: Option<PathBuf>,
    pub outputs_dir: Option<PathBuf>,
    pub stage_delay_ms: Option<u64>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "auditflow", "auditflow")
}

/// Path of the user-level config file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".auditflow").join("config.toml")
}

/// Load configuration by merging all layers.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> Result<AuditConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AuditConfig::default()));

    // User-level config
    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (AUDITFLOW_SERVER__PORT, AUDITFLOW_DATASET__PATH, etc.)
    figment = figment.merge(Env::prefixed("AUDITFLOW_").split("__"));

    if let Some(o) = overrides {
        if let Some(path) = &o.dataset_path {
            figment = figment.merge(Serialized::default("dataset.path", path));
        }
        if let Some(dir) = &o.outputs_dir {
            figment = figment.merge(Serialized::default("storage.outputs_dir", dir));
        }
        if let Some(ms) = o.stage_delay_ms {
            figment = figment.merge(Serialized::default("pipeline.stage_delay_ms", ms));
        }
        if let Some(host) = &o.host {
            figment = figment.merge(Serialized::default("server.host", host));
        }
        if let Some(port) = o.port {
            figment = figment.merge(Serialized::default("server.port", port));
        }
    }

    figment.extract().map_err(Box::new)
}

/// Default location for log files: `<data_dir>/logs`.
pub fn default_log_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuditConfig::default();
        assert_eq!(config.dataset.path, PathBuf::from("HR_Audit_FlatTable.csv"));
        assert_eq!(config.pipeline.stage_delay_ms, 500);
        assert_eq!(config.storage.outputs_dir, PathBuf::from("outputs"));
        assert_eq!(config.server.bind_addr(), "127.0.0.1:8000");
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_load_config_with_overrides() {
        let overrides = ConfigOverrides {
            port: Some(9100),
            stage_delay_ms: Some(0),
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(dir.path()), Some(&overrides)).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.pipeline.stage_delay_ms, 0);
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let ws_dir = dir.path().join(".auditflow");
        std::fs::create_dir_all(&ws_dir).unwrap();
        std::fs::write(
            ws_dir.join("config.toml"),
            r#"
[dataset]
path = "data/q4.csv"

[server]
port = 8123
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.dataset.path, PathBuf::from("data/q4.csv"));
        assert_eq!(config.server.port, 8123);
        // Unspecified keys keep their defaults.
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.storage.outputs_dir, PathBuf::from("outputs"));
    }

    #[test]
    fn test_overrides_beat_workspace_file() {
        let dir = tempfile::tempdir().unwrap();
        let ws_dir = dir.path().join(".auditflow");
        std::fs::create_dir_all(&ws_dir).unwrap();
        std::fs::write(ws_dir.join("config.toml"), "[storage]\noutputs_dir = \"from-file\"\n")
            .unwrap();
        let overrides = ConfigOverrides {
            outputs_dir: Some(PathBuf::from("from-flag")),
            ..Default::default()
        };
        let config = load_config(Some(dir.path()), Some(&overrides)).unwrap();
        assert_eq!(config.storage.outputs_dir, PathBuf::from("from-flag"));
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut config = AuditConfig::default();
        config.server.host = " ".to_string();
        config.pipeline.stage_delay_ms = 120_000;
        let problems = config.validate();
        assert_eq!(problems.len(), 2);
        let err = config.ensure_valid().unwrap_err();
        assert!(err.to_string().contains("server.host"));
    }

    #[test]
    fn test_resolve_paths() {
        let mut config = AuditConfig::default();
        config.resolve_paths(Path::new("/srv/audit"));
        assert_eq!(config.dataset.path, PathBuf::from("/srv/audit/HR_Audit_FlatTable.csv"));
        assert_eq!(config.storage.outputs_dir, PathBuf::from("/srv/audit/outputs"));
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = AuditConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: AuditConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
