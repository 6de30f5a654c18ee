// ⚙️ Configuration
// Optional TOML file, then environment overrides

use crate::auth::TokenEntry;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    /// Unset means no timeout on the analysis call
    pub request_timeout_secs: Option<u64>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub bind_addr: String,
    /// Allowed CORS origins; empty means permissive (development)
    pub cors_origins: Vec<String>,
    pub max_body_bytes: usize,
    /// Front-end build served at `/`
    pub static_dir: Option<PathBuf>,
    pub analyzer: AnalyzerConfig,
    pub tokens: Vec<TokenEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("expenses.db"),
            bind_addr: "0.0.0.0:5001".to_string(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:3001".to_string(),
            ],
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            static_dir: None,
            analyzer: AnalyzerConfig::default(),
            tokens: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config TOML")
    }

    /// Load `path` if given and present, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file: {:?}", p))?;
                info!("Loaded config from {:?}", p);
                Self::from_toml_str(&content)?
            }
            Some(p) => {
                warn!("Config file {:?} not found, using defaults", p);
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Environment overrides; `lookup` is injectable for tests
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("GEMINI_API_KEY").filter(|k| !k.is_empty()) {
            self.analyzer.api_key = Some(key);
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            self.analyzer.model = model;
        }
        if let Some(path) = lookup("HSA_LEDGER_DB") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(port) = lookup("PORT") {
            match port.parse::<u16>() {
                Ok(port) => {
                    let host = self
                        .bind_addr
                        .rsplit_once(':')
                        .map(|(host, _)| host.to_string())
                        .unwrap_or_else(|| "0.0.0.0".to_string());
                    self.bind_addr = format!("{}:{}", host, port);
                }
                Err(_) => warn!("Ignoring invalid PORT value '{}'", port),
            }
        }
        if let Some(origin) = lookup("FRONTEND_URL") {
            self.cors_origins = vec![origin];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:5001");
        assert_eq!(config.analyzer.model, DEFAULT_MODEL);
        assert_eq!(config.max_body_bytes, 50 * 1024 * 1024);
        assert!(config.analyzer.request_timeout_secs.is_none());
    }

    #[test]
    fn test_toml_file_with_tokens() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
database_path = "/tmp/ledger.db"
bind_addr = "127.0.0.1:8080"

[analyzer]
model = "gemini-1.5-pro"

[[tokens]]
token = "abc"
uid = "user-1"
email = "one@example.com"
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/ledger.db"));
        assert_eq!(config.analyzer.model, "gemini-1.5-pro");
        assert_eq!(config.analyzer.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.tokens.len(), 1);
        assert_eq!(config.tokens[0].uid, "user-1");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GEMINI_API_KEY", "key-123"),
            ("PORT", "7000"),
            ("FRONTEND_URL", "https://hsa.example.com"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.analyzer.api_key.as_deref(), Some("key-123"));
        assert_eq!(config.bind_addr, "0.0.0.0:7000");
        assert_eq!(config.cors_origins, vec!["https://hsa.example.com".to_string()]);
    }

    #[test]
    fn test_invalid_port_ignored() {
        let mut config = AppConfig::default();
        config.apply_env(|k| (k == "PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.bind_addr, "0.0.0.0:5001");
    }
}
