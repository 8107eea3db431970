//! Browser provisioning
//!
//! Having more than one Chrome browser available may produce results which
//! are confusing or unreliable, e.g. it is unclear which browser will answer
//! an intent fired by another app. Provisioning makes the selected browser
//! the only one available: it installs or enables it if needed, removes or
//! disables every other known variant, then checks the result on the device.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::common::{Error, Result};
use crate::device::Device;

use super::installer::{AndroidApp, BrowserApp};
use super::registry::{all_browsers, BrowserVariant};

/// Package filter matching every known browser variant
pub const BROWSER_PACKAGE_FILTER: &str = "chrome";

/// Options for provisioning
#[derive(Debug, Clone, Default)]
pub struct ProvisionOptions {
    /// Reinstall even if the browser is already available
    pub force_install: bool,
    /// Where APK-based variants are installed from
    pub apks_dir: Option<PathBuf>,
}

/// Browser packages that are installed and enabled right now
pub async fn available_browsers(device: &dyn Device) -> Result<BTreeSet<String>> {
    device.list_packages(BROWSER_PACKAGE_FILTER, true).await
}

/// Ensure `variant` is the single browser available on the device
///
/// Install and uninstall results are not trusted; the final re-query decides.
pub async fn ensure_single_browser(
    device: Arc<dyn Device>,
    variant: BrowserVariant,
    opts: &ProvisionOptions,
) -> Result<BrowserApp> {
    let browser = BrowserApp::new(variant.info(), device.clone(), opts.apks_dir.clone());
    let package = browser.package_name().to_string();

    let available = available_browsers(device.as_ref()).await?;
    tracing::info!("Browsers available before provisioning: {:?}", available);

    if opts.force_install || !available.contains(&package) {
        if let Err(e) = browser.install().await {
            if matches!(e, Error::ApkNotFound { .. }) {
                return Err(e);
            }
            tracing::warn!("Installing {} failed: {}", package, e);
        }
    }

    for info in all_browsers() {
        if info.package == package || !available.contains(info.package) {
            continue;
        }
        let other = BrowserApp::new(info, device.clone(), opts.apks_dir.clone());
        if let Err(e) = other.uninstall().await {
            tracing::warn!("Removing {} failed: {}", info.package, e);
        }
    }

    let mut available = available_browsers(device.as_ref()).await?;
    if !available.remove(&package) {
        tracing::error!("Browser {} is not available after provisioning", package);
        return Err(Error::BrowserUnavailable { package });
    }
    if !available.is_empty() {
        let packages: Vec<String> = available.into_iter().collect();
        tracing::error!("Browsers still available besides {}: {:?}", package, packages);
        return Err(Error::CompetingBrowsers { packages });
    }

    tracing::info!("Browser {} is the only one available", package);
    Ok(browser)
}
