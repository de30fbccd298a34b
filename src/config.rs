/*!
 * Configuration types for Patchbay
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::batch::BatchOptions;
use crate::error::{PatchError, Result};

/// Main configuration for a patch session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatchConfig {
    /// Package the manifest describes
    #[serde(default = "default_package_name")]
    pub package_name: String,

    /// Path to the JSON manifest
    #[serde(default)]
    pub manifest_path: Option<PathBuf>,

    /// Primary host root, e.g. "https://cdn.example.com/game/v12"
    #[serde(default)]
    pub default_host: String,

    /// Secondary host root (None = same as default_host)
    #[serde(default)]
    pub fallback_host: Option<String>,

    /// Local cache directory for downloaded and unpacked bundles
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Directory holding the bundles shipped with the client
    #[serde(default = "default_buildin_dir")]
    pub buildin_dir: PathBuf,

    /// Match asset paths case-insensitively
    #[serde(default)]
    pub location_to_lower: bool,

    /// Verify the BLAKE3 hash of downloaded bundles
    #[serde(default = "default_true")]
    pub verify_hash: bool,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stderr)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,

    /// Defaults for download batches
    #[serde(default)]
    pub download: BatchDefaults,

    /// Defaults for unpack batches
    #[serde(default)]
    pub unpack: BatchDefaults,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            package_name: default_package_name(),
            manifest_path: None,
            default_host: String::new(),
            fallback_host: None,
            cache_dir: default_cache_dir(),
            buildin_dir: default_buildin_dir(),
            location_to_lower: false,
            verify_hash: true,
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
            download: BatchDefaults::default(),
            unpack: BatchDefaults::default(),
        }
    }
}

/// Per-batch defaults, overridable per call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchDefaults {
    /// Maximum concurrently active units
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Retries per unit before it fails permanently
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// Seconds without byte progress before a transfer counts as timed out
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Pause between a failed attempt and its retry
    #[serde(default = "default_retry_cooldown_ms")]
    pub retry_cooldown_ms: u64,
}

impl Default for BatchDefaults {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            retry_budget: default_retry_budget(),
            timeout_secs: default_timeout_secs(),
            retry_cooldown_ms: default_retry_cooldown_ms(),
        }
    }
}

impl BatchDefaults {
    /// Convert into runtime batch options
    pub fn to_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency_limit: self.concurrency_limit,
            retry_budget: self.retry_budget,
            timeout: Duration::from_secs(self.timeout_secs),
            retry_cooldown: Duration::from_millis(self.retry_cooldown_ms),
            retain_payload: false,
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_package_name() -> String {
    "default".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("patch-cache")
}

fn default_buildin_dir() -> PathBuf {
    PathBuf::from("buildin")
}

fn default_concurrency_limit() -> usize {
    4
}

fn default_retry_budget() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_retry_cooldown_ms() -> u64 {
    1000
}

impl PatchConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: PatchConfig = toml::from_str(&contents)
            .map_err(|e| PatchError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| PatchError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// The fallback host, or the default host when none is configured
    pub fn effective_fallback_host(&self) -> &str {
        self.fallback_host.as_deref().unwrap_or(&self.default_host)
    }

    /// Check values a session cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.package_name.trim().is_empty() {
            return Err(PatchError::Config("package_name must not be empty".into()));
        }
        for (label, batch) in [("download", &self.download), ("unpack", &self.unpack)] {
            if batch.concurrency_limit == 0 {
                return Err(PatchError::Config(format!(
                    "{}.concurrency_limit must be at least 1",
                    label
                )));
            }
            if batch.timeout_secs == 0 {
                return Err(PatchError::Config(format!(
                    "{}.timeout_secs must be at least 1",
                    label
                )));
            }
        }
        Ok(())
    }
}
