//! In-memory device for unit tests
//!
//! Keeps a mutable package set, replays a script of process snapshots and
//! records every adb command it receives.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use crate::common::{Error, Result};

use super::{Device, ProcessStatus};

#[derive(Default)]
struct FakeState {
    /// Enabled packages
    packages: BTreeSet<String>,
    /// Installed but disabled packages
    disabled: BTreeSet<String>,
    /// APK file name -> package it installs
    apks: HashMap<String, String>,
    /// Packages whose uninstall silently does nothing
    stuck: BTreeSet<String>,
    /// Snapshots returned by successive process_status calls; the last repeats
    statuses: VecDeque<ProcessStatus>,
    ui_dump: String,
    files: HashMap<String, String>,
    /// Files an app has yet to write, by remote path
    pending: HashMap<String, PendingFile>,
    commands: Vec<String>,
    status_calls: usize,
}

struct PendingFile {
    content: String,
    /// Existence checks left before the file shows up
    checks_left: usize,
}

pub struct FakeDevice {
    state: Mutex<FakeState>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn with_packages(self, packages: &[&str]) -> Self {
        self.lock().packages = packages.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_disabled(self, packages: &[&str]) -> Self {
        self.lock().disabled = packages.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_apk(self, file_name: &str, package: &str) -> Self {
        self.lock()
            .apks
            .insert(file_name.to_string(), package.to_string());
        self
    }

    pub fn with_stuck_package(self, package: &str) -> Self {
        self.lock().stuck.insert(package.to_string());
        self
    }

    /// Queue process snapshots, each given as (name, pid) pairs
    pub fn with_statuses(self, statuses: Vec<Vec<(&str, u32)>>) -> Self {
        self.lock().statuses = statuses
            .into_iter()
            .map(|entries| entries.into_iter().collect())
            .collect();
        self
    }

    pub fn with_ui_dump(self, xml: &str) -> Self {
        self.lock().ui_dump = xml.to_string();
        self
    }

    /// A file some app writes on its own, visible from the `checks`-th
    /// existence check on
    pub fn with_pending_file(self, remote: &str, content: &str, checks: usize) -> Self {
        self.lock().pending.insert(
            remote.to_string(),
            PendingFile {
                content: content.to_string(),
                checks_left: checks,
            },
        );
        self
    }

    pub fn packages(&self) -> BTreeSet<String> {
        self.lock().packages.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    pub fn has_command(&self, command: &str) -> bool {
        self.lock().commands.iter().any(|c| c == command)
    }

    pub fn count_commands(&self, prefix: &str) -> usize {
        self.lock()
            .commands
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn status_calls(&self) -> usize {
        self.lock().status_calls
    }

    pub fn file(&self, remote: &str) -> Option<String> {
        self.lock().files.get(remote).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl Device for FakeDevice {
    fn serial(&self) -> &str {
        "fake-serial"
    }

    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut state = self.lock();
        state.commands.push(args.join(" "));

        match args {
            ["shell", "pm", "enable", package] => {
                if state.disabled.remove(*package) {
                    state.packages.insert(package.to_string());
                    Ok(format!("Package {} new state: enabled", package))
                } else {
                    Err(Error::adb_failed(args, "Unknown package"))
                }
            }
            ["shell", "pm", "disable-user", package] => {
                if state.packages.remove(*package) {
                    state.disabled.insert(package.to_string());
                }
                Ok(String::new())
            }
            ["shell", "wm", "size"] => Ok("Physical size: 1080x1920\n".to_string()),
            ["shell", "cat", _] => Ok(state.ui_dump.clone()),
            _ => Ok(String::new()),
        }
    }

    async fn process_status(&self) -> Result<ProcessStatus> {
        let mut state = self.lock();
        state.status_calls += 1;
        let status = if state.statuses.len() > 1 {
            state.statuses.pop_front().unwrap_or_default()
        } else {
            state.statuses.front().cloned().unwrap_or_default()
        };
        Ok(status)
    }

    async fn list_packages(&self, filter: &str, only_enabled: bool) -> Result<BTreeSet<String>> {
        let state = self.lock();
        let mut packages: BTreeSet<String> = state.packages.clone();
        if !only_enabled {
            packages.extend(state.disabled.iter().cloned());
        }
        Ok(packages.into_iter().filter(|p| p.contains(filter)).collect())
    }

    async fn install(&self, apk: &Path) -> Result<()> {
        let mut state = self.lock();
        state.commands.push(format!("install -r -d {}", apk.display()));
        let file_name = apk
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        match state.apks.get(&file_name).cloned() {
            Some(package) => {
                state.disabled.remove(&package);
                state.packages.insert(package);
                Ok(())
            }
            None => Err(Error::adb_failed(&["install"], "INSTALL_FAILED_INVALID_APK")),
        }
    }

    async fn uninstall(&self, package: &str) -> Result<()> {
        let mut state = self.lock();
        state.commands.push(format!("uninstall {}", package));
        if state.stuck.contains(package) {
            let message = "Failure [DELETE_FAILED_INTERNAL_ERROR]";
            return Err(Error::adb_failed(&["uninstall", package], message));
        }
        state.packages.remove(package);
        Ok(())
    }

    async fn file_exists(&self, remote: &str) -> Result<bool> {
        let mut state = self.lock();
        state.commands.push(format!("exists {}", remote));
        let written = match state.pending.get_mut(remote) {
            Some(file) if file.checks_left > 1 => {
                file.checks_left -= 1;
                false
            }
            Some(_) => true,
            None => false,
        };
        if written {
            if let Some(file) = state.pending.remove(remote) {
                state.files.insert(remote.to_string(), file.content);
            }
        }
        Ok(state.files.contains_key(remote))
    }

    async fn write_text(&self, remote: &str, text: &str) -> Result<()> {
        let mut state = self.lock();
        state.commands.push(format!("write {}", remote));
        state.files.insert(remote.to_string(), text.to_string());
        Ok(())
    }

    async fn pull(&self, remote: &str, local: &Path) -> Result<()> {
        let content = {
            let mut state = self.lock();
            state.commands.push(format!("pull {} {}", remote, local.display()));
            state.files.get(remote).cloned()
        };
        match content {
            Some(content) => {
                std::fs::write(local, content)?;
                Ok(())
            }
            None => Err(Error::adb_failed(&["pull", remote], "No such file or directory")),
        }
    }
}
