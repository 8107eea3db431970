//! Error types for android-stories
//!
//! Every failure of a story run travels through this single error type.
//! Assertion variants describe a broken expectation about the device
//! (a process died, a browser is missing) and always end the run.

use std::io;
use thiserror::Error;

use crate::testing::watcher::LivenessViolation;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for android-stories
#[derive(Error, Debug)]
pub enum Error {
    // === Device/Transport Errors ===
    #[error("adb binary '{0}' not found. Install platform-tools or pass --adb-bin")]
    AdbNotFound(String),

    #[error("No Android devices found. Connect a device and check 'adb devices'")]
    NoDevices,

    #[error("Device '{0}' not found")]
    DeviceNotFound(String),

    #[error("adb command '{command}' failed: {message}")]
    AdbCommandFailed { command: String, message: String },

    // === Retry Errors ===
    #[error("Gave up waiting for {what} after {attempts} attempts")]
    RetryExhausted { what: String, attempts: u32 },

    // === Watcher Assertions ===
    #[error("Process {0} is already being watched")]
    AlreadyWatching(String),

    #[error("PID for {name} not found")]
    ProcessNotFound { name: String },

    #[error("Single PID for {name} expected, but found: {pids:?}")]
    AmbiguousProcess { name: String, pids: Vec<u32> },

    #[error("Some watched processes died or got restarted: {}", format_violations(.0))]
    ProcessesNotAlive(Vec<LivenessViolation>),

    // === Provisioning Assertions ===
    #[error("Unable to make {package} available")]
    BrowserUnavailable { package: String },

    #[error("Other browsers may interfere with the test: {}", .packages.join(", "))]
    CompetingBrowsers { packages: Vec<String> },

    #[error("Unknown browser '{name}'. Available: {available}")]
    UnknownBrowser { name: String, available: String },

    #[error("APK for {package} not found at '{path}'. Use --apks-dir to point at the build output")]
    ApkNotFound { package: String, path: String },

    // === UI Assertions ===
    #[error("No UI element matching {0}")]
    UiElementNotFound(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an adb command failure from the argument list
    pub fn adb_failed<S: AsRef<str>>(args: &[S], message: &str) -> Self {
        Self::AdbCommandFailed {
            command: args.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(" "),
            message: message.trim().to_string(),
        }
    }

    /// Whether this error is a violated expectation about device state,
    /// as opposed to a transport or configuration problem
    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            Error::AlreadyWatching(_)
                | Error::ProcessNotFound { .. }
                | Error::AmbiguousProcess { .. }
                | Error::ProcessesNotAlive(_)
                | Error::BrowserUnavailable { .. }
                | Error::CompetingBrowsers { .. }
                | Error::UiElementNotFound(_)
        )
    }
}

fn format_violations(violations: &[LivenessViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
