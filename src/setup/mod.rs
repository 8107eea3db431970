//! Browser setup on the device
//!
//! This module knows which browser variants exist, how each of them is
//! installed and removed, and how to reconcile a device so that exactly one
//! of them is available.

pub mod installer;
pub mod provisioner;
pub mod registry;

use crate::common::Result;
use crate::device::Device;

pub use installer::{AndroidApp, BrowserApp, GenericApp};
pub use provisioner::{ensure_single_browser, ProvisionOptions};
pub use registry::{BrowserInfo, BrowserVariant, InstallMethod};

/// One row of the `browsers` listing
#[derive(Debug, Clone, serde::Serialize)]
pub struct BrowserListing {
    pub id: &'static str,
    pub package: &'static str,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apk: Option<&'static str>,
    pub default: bool,
    /// Whether the package is installed and enabled, when a device was queried
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
}

/// Describe every known browser, optionally checking a device for each
pub async fn list_browsers(device: Option<&dyn Device>) -> Result<Vec<BrowserListing>> {
    let available = match device {
        Some(device) => Some(provisioner::available_browsers(device).await?),
        None => None,
    };

    Ok(registry::all_browsers()
        .iter()
        .map(|info| BrowserListing {
            id: info.id,
            package: info.package,
            description: info.description,
            apk: match info.install {
                InstallMethod::Apk { filename } => Some(filename),
                InstallMethod::System => None,
            },
            default: info.variant == BrowserVariant::default(),
            available: available.as_ref().map(|set| set.contains(info.package)),
        })
        .collect())
}

/// Print the browser listing
pub fn print_browsers(listing: &[BrowserListing], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(listing)?);
        return Ok(());
    }

    for entry in listing {
        let indicator = match entry.available {
            Some(true) => "✓",
            Some(false) => "✗",
            None => " ",
        };
        let name = if entry.default {
            format!("{} (default)", entry.id)
        } else {
            entry.id.to_string()
        };
        println!(
            "  {} {:32} {:34} {}",
            indicator, name, entry.package, entry.description
        );
    }
    Ok(())
}
