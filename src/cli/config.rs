//! Configuration management for healthrag
//!
//! TOML file with built-in defaults for every missing key.
//! Location: ~/.healthrag/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{RagError, Result};
use crate::llm::DEFAULT_MODEL;
use crate::rag::RAGConfig;
use crate::store::StoreConfig;

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ollama: OllamaConfig,
    pub store: StoreConfig,
    pub retrieval: RAGConfig,
}

/// Ollama connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub host: String,
    pub port: u16,
    pub model: String,
    /// HTTP timeout for one generate request
    pub request_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 11434,
            model: DEFAULT_MODEL.to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(config_path) => {
                Self::load_from_file(&Self::expand_path(&config_path.to_string_lossy()))
            }
            None => Self::load_default(),
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RagError::ConfigError(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| RagError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from ~/.healthrag/config.toml, or built-in defaults when absent
    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(Config::default())
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".healthrag").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let retrieval = &self.retrieval;

        if retrieval.target_sources == 0 {
            return Err(RagError::ConfigError(
                "target_sources must be greater than 0".to_string(),
            ));
        }

        for (name, strategy) in [
            ("single_query", &retrieval.single_query),
            ("multi_query", &retrieval.multi_query),
        ] {
            if strategy.margins.is_empty() {
                return Err(RagError::ConfigError(format!("{}.margins must not be empty", name)));
            }
            if strategy.margins.iter().any(|m| !m.is_finite() || *m < 0.0) {
                return Err(RagError::ConfigError(format!(
                    "{}.margins must be non-negative numbers",
                    name
                )));
            }
            if strategy.margins.windows(2).any(|w| w[0] > w[1]) {
                return Err(RagError::ConfigError(format!(
                    "{}.margins must be in ascending order",
                    name
                )));
            }
            if strategy.per_query_results == 0 || strategy.expansion_results == 0 {
                return Err(RagError::ConfigError(format!(
                    "{} result counts must be greater than 0",
                    name
                )));
            }
        }

        if retrieval.context.per_source_chars == 0 || retrieval.context.max_context_chars == 0 {
            return Err(RagError::ConfigError(
                "context budgets must be greater than 0".to_string(),
            ));
        }

        if retrieval.context.per_source_chars > retrieval.context.max_context_chars {
            return Err(RagError::ConfigError(
                "per_source_chars must not exceed max_context_chars".to_string(),
            ));
        }

        if retrieval.call_timeout_secs == 0
            || retrieval.question_budget_secs == 0
            || self.ollama.request_timeout_secs == 0
        {
            return Err(RagError::ConfigError(
                "timeouts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| RagError::ConfigError(format!("Failed to serialize config: {}", e)))
    }

    /// Get Ollama base URL
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.ollama.host, self.ollama.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.ollama.request_timeout_secs)
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ollama.port, 11434);
        assert_eq!(config.retrieval.target_sources, 5);
        assert_eq!(config.store.collection, "medlineplus");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_zero_k() {
        let mut config = Config::default();
        config.retrieval.target_sources = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_margins() {
        let mut config = Config::default();
        config.retrieval.multi_query.margins = vec![];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retrieval.single_query.margins = vec![0.5, 0.3];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retrieval.single_query.margins = vec![-0.1, 0.3];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_budgets() {
        let mut config = Config::default();
        config.retrieval.context.per_source_chars = 9000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retrieval.context.max_context_chars = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retrieval.question_budget_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[ollama]\nmodel = \"llama3.1:8b\"\n\n[retrieval]\ntarget_sources = 4\n\n\
             [retrieval.multi_query]\nmargins = [0.2, 0.4]\n",
        )
        .unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.ollama.model, "llama3.1:8b");
        assert_eq!(config.ollama.port, 11434);
        assert_eq!(config.retrieval.target_sources, 4);
        assert_eq!(config.retrieval.multi_query.margins, vec![0.2, 0.4]);
        assert_eq!(config.retrieval.multi_query.min_acceptable, Some(3));
        assert_eq!(config.retrieval.multi_query.per_query_results, 60);
        assert_eq!(config.retrieval.single_query.min_acceptable, None);
        assert_eq!(config.retrieval.context.per_source_chars, 1400);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retrieval]\ntarget_sources = 0\n").unwrap();
        assert!(matches!(Config::load(Some(path.as_path())), Err(RagError::ConfigError(_))));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load(Some(missing.as_path())), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn test_to_toml_reloads_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.retrieval.trusted_domains = crate::rag::TrustedDomains::new(["nih.gov", "cdc.gov"]);
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();

        assert_eq!(Config::load(Some(path.as_path())).unwrap(), config);
    }

    #[test]
    fn test_ollama_url() {
        assert_eq!(Config::default().ollama_url(), "http://127.0.0.1:11434");
    }

    #[test]
    fn test_expand_path() {
        assert!(!Config::expand_path("~/.healthrag").to_string_lossy().contains('~'));
        assert_eq!(Config::expand_path("/absolute/path"), PathBuf::from("/absolute/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(Config::expand_path("~/x.toml"), home.join("x.toml"));
        }
    }
}
