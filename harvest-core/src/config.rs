//! Run configuration.
//!
//! Read from a JSON file. Every field has a default, so an empty object (or
//! no file at all) is a complete configuration. Command-line flags are
//! applied on top by the binary.

use harvest_scanner::{DispatcherBudget, ScanError, SessionNavigator};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value: {0}")]
    Invalid(String),
}

impl From<ScanError> for ConfigError {
    fn from(e: ScanError) -> Self {
        ConfigError::Invalid(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// Plain HTTP fetches; no script execution.
    #[default]
    Http,
    /// A headless render service reached over HTTP.
    Remote,
}

impl RendererKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "http" => Some(RendererKind::Http),
            "remote" => Some(RendererKind::Remote),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Sqlite,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "sqlite" | "db" => Some(OutputFormat::Sqlite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub kind: RendererKind,
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            kind: RendererKind::Http,
            endpoint: None,
            timeout_ms: harvest_scanner::render::DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_concurrent: usize,
    pub pressure_ceiling: f64,
    pub poll_interval_ms: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        let budget = DispatcherBudget::default();
        Self {
            max_concurrent: budget.max_concurrent(),
            pressure_ceiling: budget.pressure_ceiling(),
            poll_interval_ms: budget.poll_interval().as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub max_pages: usize,
    pub render_retries: usize,
    pub retry_backoff_ms: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            max_pages: SessionNavigator::DEFAULT_MAX_PAGES,
            render_retries: SessionNavigator::DEFAULT_RENDER_RETRIES,
            retry_backoff_ms: SessionNavigator::DEFAULT_RETRY_BACKOFF.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Extra dispatch passes over URLs that failed to fetch.
    pub fetch_retries: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { fetch_retries: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: String,
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: ".".to_string(),
            format: OutputFormat::Json,
        }
    }
}

impl OutputConfig {
    pub fn expanded_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.dir).as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub renderer: RendererConfig,
    pub budget: BudgetConfig,
    pub navigation: NavigationConfig,
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
}

impl HarvestConfig {
    /// Load from `path`; a leading `~` is expanded.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let expanded = shellexpand::tilde(path);
        Self::load_from(Path::new(expanded.as_ref()))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn dispatcher_budget(&self) -> Result<DispatcherBudget, ConfigError> {
        Ok(DispatcherBudget::new(
            self.budget.max_concurrent,
            self.budget.pressure_ceiling,
            Duration::from_millis(self.budget.poll_interval_ms),
        )?)
    }

    pub fn navigation_settings(&self) -> crate::pipeline::NavigationSettings {
        crate::pipeline::NavigationSettings {
            max_pages: self.navigation.max_pages,
            render_retries: self.navigation.render_retries,
            retry_backoff: Duration::from_millis(self.navigation.retry_backoff_ms),
            timeout_ms: self.renderer.timeout_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_object_is_all_defaults() {
        let config: HarvestConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, HarvestConfig::default());
        assert_eq!(config.budget.max_concurrent, 10);
        assert_eq!(config.budget.poll_interval_ms, 1000);
        assert_eq!(config.navigation.max_pages, 100);
        assert_eq!(config.pipeline.fetch_retries, 1);
        assert_eq!(config.renderer.kind, RendererKind::Http);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config: HarvestConfig = serde_json::from_str(
            r#"{"renderer": {"kind": "remote", "endpoint": "http://127.0.0.1:11235"},
                "budget": {"max_concurrent": 25}}"#,
        )
        .unwrap();

        assert_eq!(config.renderer.kind, RendererKind::Remote);
        assert_eq!(config.renderer.timeout_ms, 60_000);
        assert_eq!(config.budget.max_concurrent, 25);
        assert_eq!(config.budget.pressure_ceiling, 0.70);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("harvest.json");
        fs::write(&path, r#"{"output": {"dir": "/tmp/out", "format": "sqlite"}}"#).unwrap();

        let config = HarvestConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.output.format, OutputFormat::Sqlite);
        assert_eq!(config.output.expanded_dir(), PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_load_errors() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.json");
        assert!(matches!(
            HarvestConfig::load_from(&missing),
            Err(ConfigError::Read { .. })
        ));

        let broken = temp_dir.path().join("broken.json");
        fs::write(&broken, "{not json").unwrap();
        assert!(matches!(
            HarvestConfig::load_from(&broken),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_invalid_budget_rejected() {
        let mut config = HarvestConfig::default();
        config.budget.pressure_ceiling = 1.5;
        assert!(matches!(config.dispatcher_budget(), Err(ConfigError::Invalid(_))));
    }
}
