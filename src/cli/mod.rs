//! CLI command handling
//!
//! Resolves configuration and command-line overrides, connects to the
//! device and dispatches to the story runner or the setup helpers.

use std::sync::Arc;

use crate::commands::{BrowserArgs, Commands, DeviceArgs};
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::device::parse::DeviceEntry;
use crate::device::{AdbDevice, Device};
use crate::setup::{self, AndroidApp, BrowserVariant, ProvisionOptions};
use crate::testing::{RetryPolicy, StoryOptions, StoryRunner, StoryScript};

/// What a finished command asks the process to exit with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The story ran but failed
    StoryFailed,
}

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, verbose: bool) -> Result<Outcome> {
    let mut config = Config::load()?;

    match command {
        Commands::Run {
            device,
            browser,
            port,
            trace_output,
            script,
            retry_attempts,
            retry_delay_ms,
            json,
        } => {
            apply_device_args(&mut config, &device);
            if let Some(attempts) = retry_attempts {
                if attempts == 0 {
                    return Err(Error::Config("--retry-attempts must be at least 1".to_string()));
                }
                config.retry.attempts = attempts;
            }
            if let Some(delay) = retry_delay_ms {
                config.retry.initial_delay_ms = delay;
            }

            // Load the story before touching the device
            let script = match script {
                Some(path) => StoryScript::load(&path)?,
                None => StoryScript::twitter_flipkart(config.story.page_load_wait_secs),
            };

            let options = StoryOptions {
                browser: resolve_browser(&config, &browser)?,
                provision: provision_options(&config, &browser),
                devtools_port: Some(port.unwrap_or(config.device.port)),
                trace_output: trace_output.unwrap_or_else(|| config.story.trace_output.clone()),
                trace_duration: config.story.trace_duration(),
                retry: RetryPolicy::from(&config.retry),
                verbose,
            };

            let device = connect(&config).await?;
            let report = StoryRunner::new(device, script, options).run().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            if report.passed() {
                Ok(Outcome::Success)
            } else {
                Ok(Outcome::StoryFailed)
            }
        }

        Commands::Provision { device, browser } => {
            apply_device_args(&mut config, &device);
            let variant = resolve_browser(&config, &browser)?;
            let opts = provision_options(&config, &browser);

            let device = connect(&config).await?;
            let app = setup::ensure_single_browser(device, variant, &opts).await?;

            println!("{} is the only browser available", app.package_name());
            Ok(Outcome::Success)
        }

        Commands::Browsers {
            serial,
            adb_bin,
            json,
        } => {
            // Only talk to a device when one was asked for
            let listing = if serial.is_some() {
                apply_device_args(&mut config, &DeviceArgs { serial, adb_bin });
                let device = connect(&config).await?;
                setup::list_browsers(Some(device.as_ref())).await?
            } else {
                setup::list_browsers(None).await?
            };

            if !json {
                println!("Browser variants:\n");
            }
            setup::print_browsers(&listing, json)?;
            Ok(Outcome::Success)
        }

        Commands::Devices { adb_bin, json } => {
            if let Some(adb_bin) = adb_bin {
                config.device.adb_bin = adb_bin.display().to_string();
            }
            let adb = config.resolve_adb()?;
            let devices = AdbDevice::devices(&adb).await?;
            print_devices(&devices, json)?;
            Ok(Outcome::Success)
        }
    }
}

fn apply_device_args(config: &mut Config, args: &DeviceArgs) {
    if let Some(serial) = &args.serial {
        config.device.serial = Some(serial.clone());
    }
    if let Some(adb_bin) = &args.adb_bin {
        config.device.adb_bin = adb_bin.display().to_string();
    }
}

fn resolve_browser(config: &Config, args: &BrowserArgs) -> Result<BrowserVariant> {
    match args.browser {
        Some(variant) => Ok(variant),
        None => config.browser.default.parse(),
    }
}

fn provision_options(config: &Config, args: &BrowserArgs) -> ProvisionOptions {
    ProvisionOptions {
        force_install: args.force_install,
        apks_dir: args
            .apks_dir
            .clone()
            .or_else(|| config.browser.apks_dir.clone()),
    }
}

async fn connect(config: &Config) -> Result<Arc<dyn Device>> {
    let adb = config.resolve_adb()?;
    let device = AdbDevice::connect(&adb, config.device.serial.as_deref()).await?;
    tracing::info!("Using device {}", device.serial());
    device.prepare().await?;
    Ok(Arc::new(device))
}

fn print_devices(devices: &[DeviceEntry], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No devices attached");
        return Ok(());
    }
    println!("Attached devices:\n");
    for device in devices {
        let indicator = if device.is_ready() { "✓" } else { "✗" };
        println!("  {} {:24} {}", indicator, device.serial, device.state);
    }
    Ok(())
}
