// Evaluator configuration for the judge
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/evaluator.json";
pub const PYTHON_ENV_VAR: &str = "SPI_PYTHON";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Interpreter used to load and run predicates
    pub python: String,
    pub call_timeout_ms: u64,
    pub load_timeout_ms: u64,
    /// Literal string separating test groups inside a suite
    pub split_token: String,
    /// Treat the second test group as extra base tests when a suite has
    /// three or more groups
    pub merge_second_suite_into_base: bool,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            call_timeout_ms: 5000,
            load_timeout_ms: 10_000,
            split_token: "===".to_string(),
            merge_second_suite_into_base: false,
        }
    }
}

impl EvaluatorConfig {
    /// Load configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Evaluator config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: EvaluatorConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config.with_env_overrides())
    }

    /// Load with default path (config/evaluator.json), falling back to the
    /// built-in defaults when the file does not exist
    pub fn load_default() -> Result<Self> {
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if !default_path.exists() {
            tracing::debug!("No {} found, using built-in defaults", DEFAULT_CONFIG_PATH);
            return Ok(Self::default().with_env_overrides());
        }
        Self::load(default_path)
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(python) = std::env::var(PYTHON_ENV_VAR) {
            if !python.trim().is_empty() {
                self.python = python;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.python.trim().is_empty() {
            bail!("python interpreter must not be empty");
        }
        if self.call_timeout_ms == 0 || self.load_timeout_ms == 0 {
            bail!("timeouts must be at least 1ms");
        }
        if self.split_token.is_empty() {
            bail!("split_token must not be empty");
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_partial_config_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"call_timeout_ms": 250, "merge_second_suite_into_base": true}}"#).unwrap();

        let config = EvaluatorConfig::load(file.path()).unwrap();

        assert_eq!(config.call_timeout(), Duration::from_millis(250));
        assert!(config.merge_second_suite_into_base);
        assert_eq!(config.split_token, "===");
        assert_eq!(config.load_timeout_ms, 10_000);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(EvaluatorConfig::load(Path::new("no/such/evaluator.json")).is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"call_timeout_ms": 0}}"#).unwrap();

        assert!(EvaluatorConfig::load(file.path()).is_err());
    }
}
