//! YAML configuration: engine settings, capability instances and the
//! workflow catalog.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;

use capabilities::{
    BuiltinCapability, CapabilityRegistry, HttpCapability, HttpCapabilityConfig, BUILTIN_TYPE,
};
use engine::{ConditionFailurePolicy, ExecutorConfig, WorkflowDefinition};
use scheduler::{
    ServiceSettings, SourceError, WorkflowSource, DEFAULT_TIMEZONE, MAX_HISTORY_RECORDS,
};

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.into()
}

fn default_max_history() -> usize {
    MAX_HISTORY_RECORDS
}

fn default_max_recent_tasks() -> usize {
    ServiceSettings::default().max_recent_tasks
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_max_recent_tasks")]
    pub max_recent_tasks: usize,
    #[serde(default)]
    pub condition_failure: ConditionFailurePolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            max_history: default_max_history(),
            max_recent_tasks: default_max_recent_tasks(),
            condition_failure: ConditionFailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub capabilities: Vec<HttpCapabilityConfig>,
    #[serde(default)]
    pub workflows: Vec<WorkflowDefinition>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        // An empty document deserializes to unit, not a mapping.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn service_settings(&self) -> Result<ServiceSettings> {
        let default_timezone: Tz = self
            .engine
            .default_timezone
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown timezone '{}'", self.engine.default_timezone))?;
        Ok(ServiceSettings {
            max_history: self.engine.max_history,
            max_recent_tasks: self.engine.max_recent_tasks,
            default_timezone,
        })
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            condition_failure: self.engine.condition_failure,
        }
    }

    /// The builtin instance plus one HTTP instance per configured executor.
    pub fn build_registry(&self) -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        registry.register(BUILTIN_TYPE, true, Arc::new(BuiltinCapability::new()));
        for config in &self.capabilities {
            registry.register(
                config.name.clone(),
                config.enabled,
                Arc::new(HttpCapability::new(config.clone())),
            );
        }
        registry
    }
}

/// Re-reads the workflow list from the config file on every load, so
/// `reload` picks up edits without a restart.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl WorkflowSource for FileSource {
    fn load(&self) -> Result<Vec<WorkflowDefinition>, SourceError> {
        AppConfig::load(&self.path)
            .map(|c| c.workflows)
            .map_err(|e| SourceError::Load(format!("{e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
engine:
  default_timezone: UTC
  max_history: 20
  condition_failure: skip
capabilities:
  - name: playwright-1
    type: playwright
    endpoint: http://localhost:3001
    actions:
      fetch: /api/fetch
workflows:
  - id: news
    name: Daily news
    steps:
      - id: fetch
        name: Fetch
        capabilityType: playwright
        action: fetch
        params:
          url: "{{url}}"
    userInputs:
      - name: url
        defaultValue: https://example.com
    schedule:
      enabled: true
      cron: "0 9 * * *"
"#;

    #[test]
    fn parses_full_document() {
        let config = AppConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.engine.default_timezone, "UTC");
        assert_eq!(config.engine.max_history, 20);
        assert_eq!(config.engine.max_recent_tasks, ServiceSettings::default().max_recent_tasks);
        assert_eq!(config.engine.condition_failure, ConditionFailurePolicy::Skip);
        assert_eq!(config.capabilities[0].health_path, "/health");
        assert_eq!(config.workflows.len(), 1);
        assert_eq!(config.workflows[0].steps[0].capability_type, "playwright");

        let settings = config.service_settings().unwrap();
        assert_eq!(settings.default_timezone, chrono_tz::UTC);
        assert_eq!(settings.max_history, 20);
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.engine.default_timezone, DEFAULT_TIMEZONE);
        assert!(config.workflows.is_empty());
        assert_eq!(config.build_registry().instances().len(), 1);
    }

    #[test]
    fn unknown_default_timezone_is_rejected() {
        let config = AppConfig::parse("engine:\n  default_timezone: Mars/Olympus\n").unwrap();
        assert!(config.service_settings().is_err());
    }

    #[test]
    fn registry_includes_builtin_and_configured_instances() {
        let registry = AppConfig::parse(SAMPLE).unwrap().build_registry();
        let names: Vec<&str> = registry.instances().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["builtin", "playwright-1"]);
    }

    #[test]
    fn file_source_rereads_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let source = FileSource::new(file.path());
        assert_eq!(source.load().unwrap().len(), 1);

        std::fs::write(file.path(), "workflows: []\n").unwrap();
        assert!(source.load().unwrap().is_empty());

        std::fs::write(file.path(), "workflows: [").unwrap();
        assert!(matches!(source.load(), Err(SourceError::Load(_))));
    }
}
