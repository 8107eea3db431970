//! CLI command definitions
//!
//! Defines the clap commands for the android-stories CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::setup::BrowserVariant;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a user story and check that no watched process died or restarted
    Run {
        #[command(flatten)]
        device: DeviceArgs,

        #[command(flatten)]
        browser: BrowserArgs,

        /// Local port forwarded to the browser's devtools socket
        #[arg(long)]
        port: Option<u16>,

        /// Where to write the captured trace
        #[arg(long)]
        trace_output: Option<PathBuf>,

        /// YAML story to run instead of the built-in twitter_flipkart story
        #[arg(long)]
        script: Option<PathBuf>,

        /// Attempts when waiting for a process or UI element
        #[arg(long)]
        retry_attempts: Option<u32>,

        /// Delay after the first unsuccessful attempt, in milliseconds
        #[arg(long)]
        retry_delay_ms: Option<u64>,

        /// Print the report as JSON once the story is over
        #[arg(long)]
        json: bool,
    },

    /// Make the selected browser the only one available on the device
    Provision {
        #[command(flatten)]
        device: DeviceArgs,

        #[command(flatten)]
        browser: BrowserArgs,
    },

    /// List the browser variants a story can run against
    Browsers {
        /// Also check which of them are available on this device
        #[arg(long)]
        serial: Option<String>,

        /// Path to the adb binary
        #[arg(long)]
        adb_bin: Option<PathBuf>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List attached devices
    Devices {
        /// Path to the adb binary
        #[arg(long)]
        adb_bin: Option<PathBuf>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Which device to talk to, and how
#[derive(Args, Debug, Clone, Default)]
pub struct DeviceArgs {
    /// Serial of the device to use (default: first attached device)
    #[arg(long, short)]
    pub serial: Option<String>,

    /// Path to the adb binary
    #[arg(long)]
    pub adb_bin: Option<PathBuf>,
}

/// Which browser to provision, and from where
#[derive(Args, Debug, Clone, Default)]
pub struct BrowserArgs {
    /// Browser to run the story against
    #[arg(long, value_enum)]
    pub browser: Option<BrowserVariant>,

    /// Reinstall the browser even if it is already available
    #[arg(long)]
    pub force_install: bool,

    /// Directory holding the browser APKs [default: out/Release/apks]
    #[arg(long)]
    pub apks_dir: Option<PathBuf>,
}
