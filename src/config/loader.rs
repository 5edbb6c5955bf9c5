//! Configuration loading and merging logic
//!
//! Precedence order (highest to lowest):
//! 1. Environment variable overrides
//! 2. Config file
//! 3. Built-in defaults

use super::{paths, schema::Config};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const ENV_HANDLER_URL: &str = "RESOURCE_TREE_HANDLER_URL";
const ENV_POLL_INTERVAL: &str = "POLL_INTERVAL";
const ENV_REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";
const ENV_WATCH_NAMESPACE: &str = "WATCH_NAMESPACE";
const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with all layers merged.
    ///
    /// An explicit `path` must exist; the default location may be absent.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let config = match path {
            Some(path) => Self::load_file(path)?,
            None => {
                let default_path = paths::default_config_path();
                if default_path.exists() {
                    Self::load_file(&default_path)?
                } else {
                    tracing::debug!(
                        "No config file at {}, using defaults",
                        default_path.display()
                    );
                    Config::default()
                }
            }
        };

        Ok(Self::apply_env_overrides(config))
    }

    /// Load configuration from a file
    pub fn load_file(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// The file [`ConfigLoader::load`] reads when no path is given
    pub fn config_path(path: Option<&Path>) -> PathBuf {
        path.map(Path::to_path_buf)
            .unwrap_or_else(paths::default_config_path)
    }

    /// Check that durations parse and the service URL is usable
    pub fn validate(config: &Config) -> Result<()> {
        config.poll_interval()?;
        config.request_timeout()?;

        if let Some(url) = &config.resource_tree_handler_url {
            let parsed = url::Url::parse(url)
                .with_context(|| format!("Invalid resourceTreeHandlerUrl: {}", url))?;
            if parsed.cannot_be_a_base() {
                return Err(anyhow::anyhow!(
                    "resourceTreeHandlerUrl cannot be used as a base URL: {}",
                    url
                ));
            }
        }

        Ok(())
    }

    fn apply_env_overrides(config: Config) -> Config {
        Self::apply_overrides(config, |key| std::env::var(key).ok())
    }

    fn apply_overrides(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
        let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(url) = lookup(ENV_HANDLER_URL) {
            config.resource_tree_handler_url = Some(url);
        }
        if let Some(interval) = lookup(ENV_POLL_INTERVAL) {
            config.poll_interval = interval;
        }
        if let Some(timeout) = lookup(ENV_REQUEST_TIMEOUT) {
            config.request_timeout = timeout;
        }
        if let Some(namespace) = lookup(ENV_WATCH_NAMESPACE) {
            config.watch_namespace = Some(namespace);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            config.log_level = level;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pollInterval: 1m\nwatchNamespace: krateo-system").unwrap();

        let config = ConfigLoader::load_file(file.path()).unwrap();
        assert_eq!(config.poll_interval, "1m");
        assert_eq!(config.watch_namespace.as_deref(), Some("krateo-system"));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigLoader::load(Some(dir.path().join("absent.yaml").as_path()));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_rejects_bad_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pollInterval: [not, a, string]").unwrap();
        assert!(ConfigLoader::load_file(file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("RESOURCE_TREE_HANDLER_URL", "http://tree:8080"),
            ("POLL_INTERVAL", "30s"),
            ("LOG_LEVEL", "debug"),
            ("WATCH_NAMESPACE", ""),
        ]);

        let config = ConfigLoader::apply_overrides(Config::default(), |key| {
            env.get(key).map(|value| value.to_string())
        });

        assert_eq!(
            config.resource_tree_handler_url.as_deref(),
            Some("http://tree:8080")
        );
        assert_eq!(config.poll_interval, "30s");
        assert_eq!(config.request_timeout, "10s");
        assert_eq!(config.log_level, "debug");
        assert!(config.watch_namespace.is_none());
    }

    #[test]
    fn test_validate() {
        assert!(ConfigLoader::validate(&Config::default()).is_ok());

        let bad_interval = Config {
            poll_interval: "soon".to_string(),
            ..Default::default()
        };
        assert!(ConfigLoader::validate(&bad_interval).is_err());

        let zero_interval = Config {
            poll_interval: "0s".to_string(),
            ..Default::default()
        };
        assert!(ConfigLoader::validate(&zero_interval).is_err());

        let bad_url = Config {
            resource_tree_handler_url: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(ConfigLoader::validate(&bad_url).is_err());

        let opaque_url = Config {
            resource_tree_handler_url: Some("mailto:someone@example.com".to_string()),
            ..Default::default()
        };
        assert!(ConfigLoader::validate(&opaque_url).is_err());
    }
}
