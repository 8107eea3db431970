//! Android apps and how they get installed
//!
//! Defines the [`AndroidApp`] trait and the two kinds of app a story deals
//! with: plain apps referenced by package name, and the browser under test.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::common::{Error, Result};
use crate::device::Device;
use crate::testing::watcher::ProcessRef;

use super::registry::{BrowserInfo, BrowserVariant, InstallMethod};

/// File Chrome reads its command-line flags from on debuggable builds
pub const COMMAND_LINE_FILE: &str = "/data/local/tmp/chrome-command-line";

/// File Chrome reads a startup trace configuration from
pub const TRACE_CONFIG_FILE: &str = "/data/local/chrome-trace-config.json";

/// Abstract socket Chrome exposes devtools on
pub const DEVTOOLS_SOCKET: &str = "chrome_devtools_remote";

/// Where browser APKs are looked up when no directory is configured,
/// relative to the working directory
pub const DEFAULT_APKS_DIR: &str = "out/Release/apks";

/// An app on the device
#[async_trait]
pub trait AndroidApp: Send + Sync {
    /// Android package name, also the name of the app's main process
    fn package_name(&self) -> &str;

    async fn install(&self) -> Result<()>;

    async fn uninstall(&self) -> Result<()>;

    /// Stop all of the app's processes
    async fn force_stop(&self) -> Result<()>;
}

impl<'a> ProcessRef for dyn AndroidApp + 'a {
    fn process_name(&self) -> &str {
        self.package_name()
    }
}

/// An app known only by its package name, optionally with an APK to install
pub struct GenericApp {
    package: String,
    apk: Option<PathBuf>,
    device: Arc<dyn Device>,
}

impl GenericApp {
    pub fn new(device: Arc<dyn Device>, package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            apk: None,
            device,
        }
    }

    pub fn with_apk(mut self, apk: impl Into<PathBuf>) -> Self {
        self.apk = Some(apk.into());
        self
    }
}

#[async_trait]
impl AndroidApp for GenericApp {
    fn package_name(&self) -> &str {
        &self.package
    }

    async fn install(&self) -> Result<()> {
        let apk = self.apk.as_ref().ok_or_else(|| {
            Error::Config(format!("No APK configured for {}", self.package))
        })?;
        ensure_apk_exists(&self.package, apk)?;
        self.device.install(apk).await
    }

    async fn uninstall(&self) -> Result<()> {
        self.device.uninstall(&self.package).await
    }

    async fn force_stop(&self) -> Result<()> {
        self.device.force_stop(&self.package).await
    }
}

impl ProcessRef for GenericApp {
    fn process_name(&self) -> &str {
        &self.package
    }
}

/// A browser variant bound to a device
#[derive(Clone)]
pub struct BrowserApp {
    info: &'static BrowserInfo,
    device: Arc<dyn Device>,
    apks_dir: Option<PathBuf>,
    devtools_port: Option<u16>,
}

impl BrowserApp {
    pub fn new(
        info: &'static BrowserInfo,
        device: Arc<dyn Device>,
        apks_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            info,
            device,
            apks_dir,
            devtools_port: None,
        }
    }

    pub fn info(&self) -> &'static BrowserInfo {
        self.info
    }

    pub fn variant(&self) -> BrowserVariant {
        self.info.variant
    }

    /// Local path of the APK this browser installs from, if it uses one
    ///
    /// Without an explicit directory the APK is looked up in
    /// [`DEFAULT_APKS_DIR`].
    pub fn apk_path(&self) -> Option<PathBuf> {
        match self.info.install {
            InstallMethod::Apk { filename } => {
                let dir = match &self.apks_dir {
                    Some(dir) => dir.as_path(),
                    None => Path::new(DEFAULT_APKS_DIR),
                };
                Some(dir.join(filename))
            }
            InstallMethod::System => None,
        }
    }

    pub fn set_devtools_port(&mut self, port: u16) {
        self.devtools_port = Some(port);
    }

    pub fn devtools_port(&self) -> Option<u16> {
        self.devtools_port
    }

    /// Forward the configured local port to the browser's devtools socket
    pub async fn forward_devtools(&self) -> Result<()> {
        if let Some(port) = self.devtools_port {
            tracing::info!("Forwarding tcp:{} to {}", port, DEVTOOLS_SOCKET);
            self.device.forward(port, DEVTOOLS_SOCKET).await?;
        }
        Ok(())
    }

    /// Write the flags the browser picks up on its next start
    pub async fn set_command_line_flags(&self, flags: &[String]) -> Result<()> {
        // The first token is ignored by Chrome, it stands in for the program name
        let line = format!("_ {}\n", flags.join(" "));
        self.device.write_text(COMMAND_LINE_FILE, &line).await
    }
}

#[async_trait]
impl AndroidApp for BrowserApp {
    fn package_name(&self) -> &str {
        self.info.package
    }

    async fn install(&self) -> Result<()> {
        match self.info.install {
            InstallMethod::Apk { .. } => {
                let apk = self.apk_path().unwrap_or_default();
                ensure_apk_exists(self.info.package, &apk)?;
                tracing::info!("Installing {} from {}", self.info.package, apk.display());
                self.device.install(&apk).await
            }
            InstallMethod::System => {
                // Can only be enabled; fails if the image doesn't ship it
                tracing::info!("Enabling system package {}", self.info.package);
                self.device
                    .run_shell_command(&["pm", "enable", self.info.package])
                    .await?;
                Ok(())
            }
        }
    }

    async fn uninstall(&self) -> Result<()> {
        match self.info.install {
            InstallMethod::Apk { .. } => {
                tracing::info!("Uninstalling {}", self.info.package);
                self.device.uninstall(self.info.package).await
            }
            InstallMethod::System => {
                tracing::info!("Disabling system package {}", self.info.package);
                self.device
                    .run_shell_command(&["pm", "disable-user", self.info.package])
                    .await?;
                Ok(())
            }
        }
    }

    async fn force_stop(&self) -> Result<()> {
        self.device.force_stop(self.info.package).await
    }
}

impl fmt::Debug for BrowserApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserApp")
            .field("package", &self.info.package)
            .field("apks_dir", &self.apks_dir)
            .field("devtools_port", &self.devtools_port)
            .finish_non_exhaustive()
    }
}

impl ProcessRef for BrowserApp {
    fn process_name(&self) -> &str {
        self.info.package
    }
}

fn ensure_apk_exists(package: &str, apk: &Path) -> Result<()> {
    if apk.is_file() {
        Ok(())
    } else {
        Err(Error::ApkNotFound {
            package: package.to_string(),
            path: apk.display().to_string(),
        })
    }
}
