//! Configuration for the blocking-state synchronizer

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Overrides `status_url` when set
pub const STATUS_URL_ENV: &str = "FOCUSGUARD_STATUS_URL";

/// Errors found while validating a loaded configuration
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("poll_interval_ms must be greater than zero")]
    ZeroPollInterval,

    #[error("failure_threshold must be greater than zero")]
    ZeroFailureThreshold,

    #[error("status_url is not an http(s) URL: {0}")]
    InvalidStatusUrl(String),

    #[error("blocking_page_path must start with '/': {0}")]
    InvalidBlockingPagePath(String),

    #[error("not an extension origin: {0}")]
    InvalidExtensionOrigin(String),
}

/// Synchronizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Endpoint that reports `{focusing, blocked_sites}`
    #[serde(default = "default_status_url")]
    pub status_url: String,

    /// Poll period in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Consecutive failed polls tolerated while focusing before unblocking
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Extension-relative page that installed rules redirect to
    #[serde(default = "default_blocking_page_path")]
    pub blocking_page_path: String,

    /// Absolute URL tabs are sent to when intercepted. Replaced by the
    /// caller's own page when the browser passes its extension origin.
    #[serde(default = "default_blocking_page_url")]
    pub blocking_page_url: String,

    /// URL prefixes that are never treated as block candidates
    #[serde(default = "default_exempt_schemes")]
    pub exempt_schemes: Vec<String>,

    /// How long to wait for the browser to answer a host call
    #[serde(default = "default_host_call_timeout_ms")]
    pub host_call_timeout_ms: u64,

    /// Whether the browser has declarative redirect rules. Off for hosts
    /// like Safari, where interception alone enforces blocking.
    #[serde(default = "default_rule_engine")]
    pub rule_engine: bool,
}

fn default_status_url() -> String {
    "http://127.0.0.1:27190/status".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_failure_threshold() -> u32 {
    30
}

fn default_blocking_page_path() -> String {
    "/blocked.html".to_string()
}

fn default_blocking_page_url() -> String {
    "chrome-extension://focusguard/blocked.html".to_string()
}

fn default_exempt_schemes() -> Vec<String> {
    [
        "chrome-extension://",
        "chrome://",
        "safari-web-extension://",
        "moz-extension://",
        "edge://",
        "about:",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_host_call_timeout_ms() -> u64 {
    5000
}

fn default_rule_engine() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            status_url: default_status_url(),
            poll_interval_ms: default_poll_interval_ms(),
            failure_threshold: default_failure_threshold(),
            blocking_page_path: default_blocking_page_path(),
            blocking_page_url: default_blocking_page_url(),
            exempt_schemes: default_exempt_schemes(),
            host_call_timeout_ms: default_host_call_timeout_ms(),
            rule_engine: default_rule_engine(),
        }
    }
}

impl Config {
    /// Load config from file, falling back to defaults when it is missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Load, apply environment overrides and validate
    pub fn resolve(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Apply overrides from an environment lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(STATUS_URL_ENV) {
            if !url.trim().is_empty() {
                self.status_url = url.trim().to_string();
            }
        }
    }

    /// Point `blocking_page_url` at the blocking page of the extension
    /// that launched us, e.g. `chrome-extension://<id>/`
    pub fn set_extension_origin(&mut self, origin: &str) -> std::result::Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidExtensionOrigin(origin.to_string());
        let base = url::Url::parse(origin).map_err(|_| invalid())?;
        if !base.scheme().ends_with("-extension") || base.host_str().is_none() {
            return Err(invalid());
        }
        let page = base.join(&self.blocking_page_path).map_err(|_| invalid())?;
        self.blocking_page_url = page.to_string();
        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        match url::Url::parse(&self.status_url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            _ => return Err(ConfigError::InvalidStatusUrl(self.status_url.clone())),
        }
        if !self.blocking_page_path.starts_with('/') {
            return Err(ConfigError::InvalidBlockingPagePath(
                self.blocking_page_path.clone(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn host_call_timeout(&self) -> Duration {
        Duration::from_millis(self.host_call_timeout_ms)
    }
}
