//! Browser registry and metadata
//!
//! The set of browser variants is closed: every variant the tool can
//! provision is listed here, together with how to install it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::common::Error;

/// Supported browser variants
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum BrowserVariant {
    /// Chrome built from source, installed from Chrome.apk
    #[default]
    AndroidChrome,
    /// Chromium built from source, installed from ChromePublic.apk
    AndroidChromium,
    /// Chrome preinstalled on the system image
    AndroidSystemChrome,
}

impl BrowserVariant {
    /// Registry entry for this variant
    pub fn info(self) -> &'static BrowserInfo {
        // Every variant has exactly one entry in BROWSERS
        BROWSERS
            .iter()
            .find(|b| b.variant == self)
            .unwrap_or(&BROWSERS[0])
    }

    pub fn id(self) -> &'static str {
        self.info().id
    }
}

impl fmt::Display for BrowserVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for BrowserVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        get_browser(s).map(|b| b.variant).ok_or_else(|| Error::UnknownBrowser {
            name: s.to_string(),
            available: all_browsers()
                .iter()
                .map(|b| b.id)
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

/// How a browser gets onto (and off) the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMethod {
    /// `adb install` an APK from the APK directory; `adb uninstall` to remove
    Apk { filename: &'static str },
    /// Part of the system image: `pm enable` to install, `pm disable-user` to remove
    System,
}

/// Information about a browser variant
#[derive(Debug, Clone)]
pub struct BrowserInfo {
    pub variant: BrowserVariant,
    /// Command-line identifier (e.g., "android-chrome")
    pub id: &'static str,
    /// Android package name
    pub package: &'static str,
    pub install: InstallMethod,
    pub description: &'static str,
}

/// All available browsers
static BROWSERS: &[BrowserInfo] = &[
    BrowserInfo {
        variant: BrowserVariant::AndroidChrome,
        id: "android-chrome",
        package: "com.google.android.apps.chrome",
        install: InstallMethod::Apk {
            filename: "Chrome.apk",
        },
        description: "Locally built Chrome",
    },
    BrowserInfo {
        variant: BrowserVariant::AndroidChromium,
        id: "android-chromium",
        package: "org.chromium.chrome",
        install: InstallMethod::Apk {
            filename: "ChromePublic.apk",
        },
        description: "Locally built Chromium",
    },
    BrowserInfo {
        variant: BrowserVariant::AndroidSystemChrome,
        id: "android-system-chrome",
        package: "com.android.chrome",
        install: InstallMethod::System,
        description: "Chrome from the system image",
    },
];

/// Get all registered browsers
pub fn all_browsers() -> &'static [BrowserInfo] {
    BROWSERS
}

/// Get browser info by command-line identifier
pub fn get_browser(id: &str) -> Option<&'static BrowserInfo> {
    BROWSERS.iter().find(|b| b.id == id)
}
