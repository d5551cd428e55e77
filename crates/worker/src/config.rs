//! Worker configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use oncoflow_core::workspace::WorkspacePolicy;
use oncoflow_pipeline::context::PipelineEnv;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime configuration for the worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Root of the storage area holding per-job workspaces.
    pub storage_path: PathBuf,
    /// Directory holding the pipeline shell scripts.
    pub script_path: PathBuf,
    /// Base URL under which the storage area is publicly served.
    pub public_base_url: String,
    /// How often the dispatcher polls for queued jobs.
    pub poll_interval: Duration,
    /// Unix mode applied to job directories at provisioning.
    pub workspace_mode: u32,
}

impl WorkerConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let require = |name: &'static str| {
            var(name)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let poll_interval_ms = match var("ONCOFLOW_POLL_INTERVAL_MS") {
            Some(value) => value.parse::<u64>().map_err(|_| ConfigError::Invalid {
                name: "ONCOFLOW_POLL_INTERVAL_MS",
                value,
            })?,
            None => 1000,
        };
        let workspace_mode = match var("ONCOFLOW_WORKSPACE_MODE") {
            Some(value) => {
                u32::from_str_radix(&value, 8).map_err(|_| ConfigError::Invalid {
                    name: "ONCOFLOW_WORKSPACE_MODE",
                    value,
                })?
            }
            None => 0o777,
        };

        Ok(Self {
            database_url: require("DATABASE_URL")?,
            storage_path: PathBuf::from(require("ONCOFLOW_STORAGE_PATH")?),
            script_path: PathBuf::from(require("ONCOFLOW_SCRIPT_PATH")?),
            public_base_url: var("ONCOFLOW_PUBLIC_URL")
                .unwrap_or_else(|| "/storage".to_string()),
            poll_interval: Duration::from_millis(poll_interval_ms),
            workspace_mode,
        })
    }

    /// The pipeline environment derived from this configuration.
    pub fn pipeline_env(&self) -> PipelineEnv {
        PipelineEnv {
            storage_root: self.storage_path.clone(),
            script_root: self.script_path.clone(),
            public_base_url: self.public_base_url.clone(),
            workspace_policy: WorkspacePolicy {
                dir_mode: Some(self.workspace_mode),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn config_from(entries: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let map = vars(entries);
        WorkerConfig::from_vars(|name| map.get(name).cloned())
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/oncoflow"),
        ("ONCOFLOW_STORAGE_PATH", "/var/lib/oncoflow/storage"),
        ("ONCOFLOW_SCRIPT_PATH", "/opt/oncoflow/scripts"),
    ];

    #[test]
    fn minimal_configuration_uses_defaults() {
        let config = config_from(MINIMAL).unwrap();
        assert_eq!(config.public_base_url, "/storage");
        assert_eq!(config.poll_interval, Duration::from_millis(1000));
        assert_eq!(config.workspace_mode, 0o777);
    }

    #[test]
    fn missing_required_variable_is_an_error() {
        let err = config_from(&MINIMAL[..2]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ONCOFLOW_SCRIPT_PATH")));
    }

    #[test]
    fn workspace_mode_parses_as_octal() {
        let mut entries = MINIMAL.to_vec();
        entries.push(("ONCOFLOW_WORKSPACE_MODE", "750"));
        let config = config_from(&entries).unwrap();
        assert_eq!(config.workspace_mode, 0o750);

        let mut bad = MINIMAL.to_vec();
        bad.push(("ONCOFLOW_WORKSPACE_MODE", "rwx"));
        assert!(matches!(
            config_from(&bad).unwrap_err(),
            ConfigError::Invalid { .. }
        ));
    }

    #[test]
    fn poll_interval_overrides() {
        let mut entries = MINIMAL.to_vec();
        entries.push(("ONCOFLOW_POLL_INTERVAL_MS", "250"));
        let config = config_from(&entries).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn pipeline_env_carries_the_policy() {
        let config = config_from(MINIMAL).unwrap();
        let env = config.pipeline_env();
        assert_eq!(env.workspace_policy.dir_mode, Some(0o777));
        assert_eq!(env.script_root, PathBuf::from("/opt/oncoflow/scripts"));
    }
}
