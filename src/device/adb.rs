//! adb-backed device implementation
//!
//! Every operation spawns the adb binary with `-s <serial>`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::common::{Error, Result};

use super::parse::{parse_devices, DeviceEntry};
use super::Device;

/// A device reached through the adb binary
#[derive(Debug, Clone)]
pub struct AdbDevice {
    adb: PathBuf,
    serial: String,
}

impl AdbDevice {
    pub fn new(adb: impl Into<PathBuf>, serial: impl Into<String>) -> Self {
        Self {
            adb: adb.into(),
            serial: serial.into(),
        }
    }

    /// List devices known to the adb server
    pub async fn devices(adb: &Path) -> Result<Vec<DeviceEntry>> {
        let output = run_adb(adb, &["devices"]).await?;
        Ok(parse_devices(&output))
    }

    /// Connect to the device with the given serial, or to the first ready
    /// device when no serial is given
    pub async fn connect(adb: &Path, serial: Option<&str>) -> Result<Self> {
        let devices = Self::devices(adb).await?;

        match serial {
            Some(serial) => {
                if !devices.iter().any(|d| d.serial == serial) {
                    return Err(Error::DeviceNotFound(serial.to_string()));
                }
                Ok(Self::new(adb, serial))
            }
            None => {
                let first = devices
                    .into_iter()
                    .find(DeviceEntry::is_ready)
                    .ok_or(Error::NoDevices)?;
                tracing::warn!("Connected to first device found: {}", first.serial);
                Ok(Self::new(adb, first.serial))
            }
        }
    }

    /// Restart adbd as root and wait for the device to come back
    ///
    /// Some operations (writing the browser command-line file, disabling
    /// system packages) need a rooted adbd.
    pub async fn prepare(&self) -> Result<()> {
        if let Err(e) = self.run_command(&["root"]).await {
            tracing::warn!("adb root failed, continuing unrooted: {}", e);
        }
        self.run_command(&["wait-for-device"]).await?;
        Ok(())
    }
}

#[async_trait]
impl Device for AdbDevice {
    fn serial(&self) -> &str {
        &self.serial
    }

    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut full = Vec::with_capacity(args.len() + 2);
        full.push("-s");
        full.push(self.serial.as_str());
        full.extend_from_slice(args);
        run_adb(&self.adb, &full).await
    }
}

/// Run the adb binary and return its stdout
async fn run_adb(adb: &Path, args: &[&str]) -> Result<String> {
    tracing::debug!("adb {}", args.join(" "));

    let output = Command::new(adb)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::AdbNotFound(adb.display().to_string())
            } else {
                Error::adb_failed(args, &e.to_string())
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = if stderr.trim().is_empty() {
            format!("exit code {}", output.status.code().unwrap_or(-1))
        } else {
            stderr.to_string()
        };
        return Err(Error::adb_failed(args, &message));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_adb_binary() {
        let err = AdbDevice::devices(Path::new("/nonexistent/adb"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AdbNotFound(_)));
    }

    #[test]
    fn test_serial_accessor() {
        let device = AdbDevice::new("adb", "emulator-5554");
        assert_eq!(device.serial(), "emulator-5554");
    }
}
