//! Configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global configuration for deskline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub zendesk: ZendeskConfig,
    pub http: HttpConfig,
    pub output: OutputConfig,
    pub workers: WorkersConfig,
}

/// Account settings; every value can be overridden on the command line
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ZendeskConfig {
    pub admin_email: Option<String>,
    /// `${VAR}` is expanded from the environment
    #[serde(deserialize_with = "deserialize_env_var")]
    pub api_token: Option<String>,
    pub subdomains: Vec<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Seconds
    pub connect_timeout: u64,
    /// Seconds
    pub read_timeout: u64,
    pub max_retries: u32,
    /// Seconds
    pub max_retry_wait: u64,
    pub max_retry_jitter_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: 300,
            read_timeout: 300,
            max_retries: 20,
            max_retry_wait: 240,
            max_retry_jitter_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub default_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub default: usize,
    pub max: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            default: 4,
            max: 16,
        }
    }
}

impl WorkersConfig {
    /// Requested worker count, falling back to the default and capped at max
    pub fn resolve(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default).clamp(1, self.max.max(1))
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./deskline.toml (current directory)
    /// 2. ~/.config/deskline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("deskline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(path) = Self::user_config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn user_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "deskline")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.output.default_dir, PathBuf::from("./data"));
        assert_eq!(config.http.max_retries, 20);
        assert_eq!(config.http.max_retry_wait, 240);
        assert!(config.zendesk.subdomains.is_empty());
    }

    #[test]
    fn expand_env_var_simple() {
        std::env::set_var("DESKLINE_TEST_TOKEN", "test_value");
        assert_eq!(
            expand_env_var("${DESKLINE_TEST_TOKEN}"),
            Some("test_value".to_string())
        );
        std::env::remove_var("DESKLINE_TEST_TOKEN");
    }

    #[test]
    fn expand_env_var_literal() {
        assert_eq!(expand_env_var("literal"), Some("literal".to_string()));
    }

    #[test]
    fn expand_env_var_missing() {
        assert_eq!(expand_env_var("${NONEXISTENT_VAR_12345}"), None);
    }

    #[test]
    fn workers_resolve() {
        let workers = WorkersConfig { default: 4, max: 8 };
        assert_eq!(workers.resolve(None), 4);
        assert_eq!(workers.resolve(Some(2)), 2);
        assert_eq!(workers.resolve(Some(64)), 8);
        assert_eq!(workers.resolve(Some(0)), 1);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[zendesk]
admin_email = "admin@acme.com"
api_token = "plain-token"
subdomains = ["acme", "globex"]

[http]
read_timeout = 60
max_retries = 5

[output]
default_dir = "/tmp/data"

[workers]
default = 2
max = 8
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.zendesk.admin_email.as_deref(), Some("admin@acme.com"));
        assert_eq!(config.zendesk.api_token.as_deref(), Some("plain-token"));
        assert_eq!(config.zendesk.subdomains, ["acme", "globex"]);
        assert_eq!(config.http.read_timeout, 60);
        assert_eq!(config.http.connect_timeout, 300);
        assert_eq!(config.http.max_retries, 5);
        assert_eq!(config.output.default_dir, PathBuf::from("/tmp/data"));
        assert_eq!(config.workers.default, 2);
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("deskline.toml");
        std::fs::write(&path, "[output]\ndefault_dir = \"out\"\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.output.default_dir, PathBuf::from("out"));
        assert!(Config::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
