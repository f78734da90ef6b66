//! Configuration Management
//!
//! Handles persistent configuration storage for sls-compose.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sls_compose::resource::OutputFormat;
use std::path::PathBuf;

const DEFAULT_STAGE: &str = "dev";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Stage used when neither the CLI nor the declaration names one
    #[serde(default)]
    pub stage: Option<String>,
    /// Preferred output format
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("sls-compose").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content),
            Err(err) => {
                tracing::warn!("failed to read {:?}: {}", path, err);
                Self::default()
            }
        }
    }

    fn parse(content: &str) -> Self {
        serde_json::from_str(content).unwrap_or_default()
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        tracing::debug!("saved config to {:?}", path);

        Ok(())
    }

    /// Get effective stage (CLI > declaration > config > "dev")
    pub fn effective_stage(&self, cli: Option<&str>, declared: Option<&str>) -> String {
        cli.or(declared)
            .or(self.stage.as_deref())
            .unwrap_or(DEFAULT_STAGE)
            .to_string()
    }

    /// Get effective format (CLI > config > JSON)
    pub fn effective_format(&self, cli: Option<OutputFormat>) -> OutputFormat {
        cli.or(self.format).unwrap_or_default()
    }

    /// Remember stage and format and save
    pub fn remember(&mut self, stage: &str, format: OutputFormat) -> Result<()> {
        self.stage = Some(stage.to_string());
        self.format = Some(format);
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_precedence() {
        let config = Config {
            stage: Some("qa".into()),
            format: None,
        };
        assert_eq!(config.effective_stage(Some("prod"), Some("staging")), "prod");
        assert_eq!(config.effective_stage(None, Some("staging")), "staging");
        assert_eq!(config.effective_stage(None, None), "qa");
        assert_eq!(Config::default().effective_stage(None, None), "dev");
    }

    #[test]
    fn test_format_precedence() {
        let config = Config {
            stage: None,
            format: Some(OutputFormat::Yaml),
        };
        assert_eq!(config.effective_format(None), OutputFormat::Yaml);
        assert_eq!(config.effective_format(Some(OutputFormat::Json)), OutputFormat::Json);
        assert_eq!(Config::default().effective_format(None), OutputFormat::Json);
    }

    #[test]
    fn test_parse_tolerates_garbage() {
        assert_eq!(Config::parse("not json"), Config::default());
        let parsed = Config::parse(r#"{"stage":"prod","format":"yaml"}"#);
        assert_eq!(parsed.stage.as_deref(), Some("prod"));
        assert_eq!(parsed.format, Some(OutputFormat::Yaml));
    }
}
