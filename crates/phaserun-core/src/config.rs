use crate::error::{PipelineError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// BackendConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Endpoint that starts one phase and answers with a `data:` record stream.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Log a warning when the initial connection takes longer than this.
    #[serde(default = "default_connect_warning_secs")]
    pub connect_warning_secs: u64,
}

fn default_endpoint() -> String {
    "http://localhost:3000/api/execute-phase".to_string()
}

fn default_connect_warning_secs() -> u64 {
    15
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_warning_secs: default_connect_warning_secs(),
        }
    }
}

impl BackendConfig {
    pub fn connect_warning(&self) -> Duration {
        Duration::from_secs(self.connect_warning_secs)
    }
}

// ---------------------------------------------------------------------------
// ExecutionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Shown to the UI as the intended parallelism. Every phase still starts
    /// at once; nothing gates admission on this value.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Cadence at which streamed output is surfaced.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_concurrency() -> usize {
    3
}

fn default_debounce_ms() -> u64 {
    50
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl ExecutionConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

// ---------------------------------------------------------------------------
// ModelConfig
// ---------------------------------------------------------------------------

/// Model selection forwarded verbatim to the backend as `modelConfig`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            backend: BackendConfig::default(),
            execution: ExecutionConfig::default(),
            model: ModelConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(PipelineError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let endpoint = self.backend.endpoint.trim();
        if endpoint.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "backend.endpoint is empty".to_string(),
            });
        } else if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("backend.endpoint '{endpoint}' is not an http(s) URL"),
            });
        }

        if self.execution.debounce_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "execution.debounce_ms is 0: every fragment is surfaced immediately"
                    .to_string(),
            });
        } else if self.execution.debounce_ms > 5_000 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "execution.debounce_ms={} (>5000 makes streamed output look stalled)",
                    self.execution.debounce_ms
                ),
            });
        }

        if self.execution.concurrency == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "execution.concurrency is 0".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::new("test-project");
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.project.name, "test-project");
        assert_eq!(parsed.execution.debounce_ms, 50);
        assert_eq!(parsed.execution.concurrency, 3);
    }

    #[test]
    fn minimal_yaml_fills_defaults() {
        let cfg: Config = serde_yaml::from_str("project:\n  name: demo\n").unwrap();
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.backend.endpoint, default_endpoint());
        assert_eq!(cfg.backend.connect_warning(), Duration::from_secs(15));
        assert_eq!(cfg.model, ModelConfig::default());
    }

    #[test]
    fn load_without_config_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(PipelineError::NotInitialized)
        ));
    }

    #[test]
    fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("demo");
        cfg.model.model = Some("large".into());
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.model.model.as_deref(), Some("large"));
    }

    #[test]
    fn model_config_serializes_camel_case() {
        let model = ModelConfig {
            max_tokens: Some(4096),
            ..Default::default()
        };
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json, serde_json::json!({"maxTokens": 4096}));
    }

    #[test]
    fn validate_default_is_clean() {
        assert!(Config::new("demo").validate().is_empty());
    }

    #[test]
    fn validate_flags_bad_endpoint_and_debounce() {
        let mut cfg = Config::new("demo");
        cfg.backend.endpoint = "localhost:3000".into();
        cfg.execution.debounce_ms = 0;
        cfg.execution.concurrency = 0;
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 3);
        assert_eq!(warnings[0].level, WarnLevel::Error);
    }
}
