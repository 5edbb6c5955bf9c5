//! Configuration schema definitions

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the resource tree service, e.g. `http://tree-handler:8080`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_tree_handler_url: Option<String>,

    /// How long a published tree stays fresh before a poll rebuilds it
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// Timeout for each call to the resource tree service
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,

    /// Only discover CompositionReferences in this namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch_namespace: Option<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_poll_interval() -> String {
    "5m".to_string()
}

fn default_request_timeout() -> String {
    "10s".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resource_tree_handler_url: None,
            poll_interval: default_poll_interval(),
            request_timeout: default_request_timeout(),
            watch_namespace: None,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Result<Duration> {
        let interval = parse_duration(&self.poll_interval).context("Invalid pollInterval")?;
        if interval.is_zero() {
            anyhow::bail!("pollInterval must be greater than zero");
        }
        Ok(interval)
    }

    pub fn request_timeout(&self) -> Result<Duration> {
        parse_duration(&self.request_timeout).context("Invalid requestTimeout")
    }
}

/// Parse a duration string like `500ms`, `30s`, `5m` or `1h`
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        let ms: u64 = ms.parse().context("Invalid milliseconds in duration")?;
        Ok(Duration::from_millis(ms))
    } else if let Some(secs) = s.strip_suffix('s') {
        let secs: u64 = secs.parse().context("Invalid seconds in duration")?;
        Ok(Duration::from_secs(secs))
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins: u64 = mins.parse().context("Invalid minutes in duration")?;
        mins
            .checked_mul(60)
            .map(Duration::from_secs)
            .context("Duration too large")
    } else if let Some(hours) = s.strip_suffix('h') {
        let hours: u64 = hours.parse().context("Invalid hours in duration")?;
        hours
            .checked_mul(3600)
            .map(Duration::from_secs)
            .context("Duration too large")
    } else {
        anyhow::bail!("Invalid duration format: {}", s)
    }
}
