//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Device connection settings
    #[serde(default)]
    pub device: DeviceConfig,

    /// Browser selection and APK location
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Polling settings for process queries
    #[serde(default)]
    pub retry: RetryConfig,

    /// Story execution settings
    #[serde(default)]
    pub story: StoryConfig,
}

/// Device connection settings
#[derive(Debug, Deserialize)]
pub struct DeviceConfig {
    /// adb binary name or path
    #[serde(default = "default_adb_bin")]
    pub adb_bin: String,

    /// Device serial; first attached device when unset
    #[serde(default)]
    pub serial: Option<String>,

    /// Local port forwarded to the browser's devtools socket
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb_bin: default_adb_bin(),
            serial: None,
            port: default_port(),
        }
    }
}

fn default_adb_bin() -> String {
    "adb".to_string()
}

fn default_port() -> u16 {
    1234
}

/// Browser settings
#[derive(Debug, Deserialize)]
pub struct BrowserConfig {
    /// Browser variant to provision
    #[serde(default = "default_browser")]
    pub default: String,

    /// Directory holding the browser APKs; `out/Release/apks` when unset
    #[serde(default)]
    pub apks_dir: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            default: default_browser(),
            apks_dir: None,
        }
    }
}

fn default_browser() -> String {
    "android-chrome".to_string()
}

/// Retry settings for device process polling
#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, including the first
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Delay before the second attempt
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Multiplier applied to the delay after each attempt
    #[serde(default = "default_backoff")]
    pub backoff: u32,

    /// Upper bound for a single delay
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            initial_delay_ms: default_initial_delay(),
            backoff: default_backoff(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_attempts() -> u32 {
    6
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_backoff() -> u32 {
    2
}
fn default_max_delay() -> u64 {
    8000
}

/// Story execution settings
#[derive(Debug, Deserialize)]
pub struct StoryConfig {
    /// Seconds to wait for the browser page to load
    #[serde(default = "default_page_load_wait")]
    pub page_load_wait_secs: u64,

    /// Where the collected trace is written
    #[serde(default = "default_trace_output")]
    pub trace_output: PathBuf,

    /// Seconds the browser traces after it starts
    #[serde(default = "default_trace_duration")]
    pub trace_duration_secs: u64,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            page_load_wait_secs: default_page_load_wait(),
            trace_output: default_trace_output(),
            trace_duration_secs: default_trace_duration(),
        }
    }
}

fn default_page_load_wait() -> u64 {
    10
}

fn default_trace_output() -> PathBuf {
    PathBuf::from("trace.json")
}

fn default_trace_duration() -> u64 {
    30
}

impl StoryConfig {
    pub fn trace_duration(&self) -> Duration {
        Duration::from_secs(self.trace_duration_secs)
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.retry.attempts == 0 {
            return Err(Error::Config(
                "retry.attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.backoff == 0 {
            return Err(Error::Config("retry.backoff must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Locate the adb binary
    ///
    /// Accepts either an explicit path or a name searched in PATH
    pub fn resolve_adb(&self) -> Result<PathBuf> {
        let candidate = PathBuf::from(&self.device.adb_bin);
        if candidate.components().count() > 1 {
            if candidate.exists() {
                return Ok(candidate);
            }
            return Err(Error::AdbNotFound(self.device.adb_bin.clone()));
        }
        which::which(&self.device.adb_bin)
            .map_err(|_| Error::AdbNotFound(self.device.adb_bin.clone()))
    }
}
