//! Android device access
//!
//! The [`Device`] trait is the seam between the story core and the device
//! transport. Implementors only have to provide the two raw command
//! primitives; everything else has a default built on top of them that
//! speaks adb/shell, and can be overridden by fakes in tests.

pub mod actions;
pub mod adb;
pub mod parse;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::Path;

use crate::common::{Error, Result};

pub use actions::{Actions, UiSelector};
pub use adb::AdbDevice;

/// Process names mapped to the PIDs currently running under them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessStatus {
    pids: HashMap<String, Vec<u32>>,
}

impl ProcessStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a running process
    pub fn insert(&mut self, name: impl Into<String>, pid: u32) {
        self.pids.entry(name.into()).or_default().push(pid);
    }

    /// PIDs running under `name`, in the order the device listed them.
    /// Empty if nothing runs under that name.
    pub fn pids(&self, name: &str) -> &[u32] {
        self.pids.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        !self.pids(name).is_empty()
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for ProcessStatus {
    fn from_iter<I: IntoIterator<Item = (S, u32)>>(iter: I) -> Self {
        let mut status = Self::new();
        for (name, pid) in iter {
            status.insert(name, pid);
        }
        status
    }
}

/// A connected Android device
#[async_trait]
pub trait Device: Send + Sync {
    /// Serial number identifying the device to adb
    fn serial(&self) -> &str;

    /// Run an adb sub-command against this device and return its stdout
    async fn run_command(&self, args: &[&str]) -> Result<String>;

    /// Run a shell command on the device and return its stdout
    async fn run_shell_command(&self, args: &[&str]) -> Result<String> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("shell");
        full.extend_from_slice(args);
        self.run_command(&full).await
    }

    /// Snapshot of every running process on the device
    async fn process_status(&self) -> Result<ProcessStatus> {
        // Toybox ps needs -A to list everything; older toolbox ps rejects it
        match self.run_shell_command(&["ps", "-A", "-o", "PID,NAME"]).await {
            Ok(output) => {
                let status = parse::parse_process_status(&output);
                if !status.is_empty() {
                    return Ok(status);
                }
            }
            Err(e) => tracing::debug!("ps -A failed, falling back to plain ps: {}", e),
        }
        let output = self.run_shell_command(&["ps"]).await?;
        Ok(parse::parse_process_status(&output))
    }

    /// Installed packages whose name contains `filter`
    async fn list_packages(&self, filter: &str, only_enabled: bool) -> Result<BTreeSet<String>> {
        let mut args = vec!["pm", "list", "packages"];
        if only_enabled {
            args.push("-e");
        }
        if !filter.is_empty() {
            args.push(filter);
        }
        let output = self.run_shell_command(&args).await?;
        Ok(parse::parse_package_list(&output))
    }

    /// Install (or reinstall, allowing downgrades) an APK
    async fn install(&self, apk: &Path) -> Result<()> {
        let apk = apk.to_string_lossy();
        let output = self.run_command(&["install", "-r", "-d", &apk]).await?;
        if output.contains("Failure") {
            return Err(Error::adb_failed(&["install", &apk], &output));
        }
        Ok(())
    }

    async fn uninstall(&self, package: &str) -> Result<()> {
        let output = self.run_command(&["uninstall", package]).await?;
        if output.contains("Failure") {
            return Err(Error::adb_failed(&["uninstall", package], &output));
        }
        Ok(())
    }

    async fn push(&self, local: &Path, remote: &str) -> Result<()> {
        let local = local.to_string_lossy();
        self.run_command(&["push", &local, remote]).await?;
        Ok(())
    }

    async fn pull(&self, remote: &str, local: &Path) -> Result<()> {
        let local = local.to_string_lossy();
        self.run_command(&["pull", remote, &local]).await?;
        Ok(())
    }

    /// Whether a file or directory exists on the device
    async fn file_exists(&self, remote: &str) -> Result<bool> {
        // Exits 0 either way so adb doesn't report a failure for a missing file
        let test = ["[", "-e", remote, "]", "&&", "echo", "present", "||", "true"];
        let output = self.run_shell_command(&test).await?;
        Ok(output.trim() == "present")
    }

    /// Write `text` to a file on the device
    async fn write_text(&self, remote: &str, text: &str) -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(text.as_bytes())?;
        file.flush()?;
        self.push(file.path(), remote).await
    }

    /// Stop every process of an app
    async fn force_stop(&self, package: &str) -> Result<()> {
        self.run_shell_command(&["am", "force-stop", package]).await?;
        Ok(())
    }

    /// Forward a local TCP port to an abstract socket on the device
    async fn forward(&self, local_port: u16, remote_socket: &str) -> Result<()> {
        let local = format!("tcp:{}", local_port);
        let remote = format!("localabstract:{}", remote_socket);
        self.run_command(&["forward", &local, &remote]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_name_has_no_pids() {
        let status: ProcessStatus = [("com.twitter.android", 100)].into_iter().collect();
        assert_eq!(status.pids("com.twitter.android"), &[100]);
        assert!(status.pids("com.android.chrome").is_empty());
        assert!(!status.contains("com.android.chrome"));
    }

    /// Answers every command with a fixed output
    struct EchoDevice(&'static str);

    #[async_trait]
    impl Device for EchoDevice {
        fn serial(&self) -> &str {
            "echo"
        }

        async fn run_command(&self, args: &[&str]) -> Result<String> {
            assert_eq!(args[..3], ["shell", "[", "-e"]);
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_file_exists_reads_shell_answer() {
        assert!(EchoDevice("present\n").file_exists("/sdcard/x").await.unwrap());
        assert!(!EchoDevice("").file_exists("/sdcard/x").await.unwrap());
    }

    #[test]
    fn test_duplicate_names_keep_listing_order() {
        let status: ProcessStatus = [("sh", 30), ("sh", 10)].into_iter().collect();
        assert_eq!(status.pids("sh"), &[30, 10]);
        assert_eq!(status.len(), 1);
    }
}
