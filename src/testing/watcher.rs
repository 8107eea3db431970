//! Process watcher
//!
//! Records the PID of each process a story cares about, then proves at the
//! end of the story that none of them died or was replaced by a new
//! instance. Identity is the exact PID: a process that crashed and was
//! relaunched under the same name counts as restarted.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::common::{Error, Result};
use crate::device::Device;

use super::retry::RetryPolicy;

/// Anything that names a process on the device
///
/// Plain names and apps (through their package name) both qualify.
pub trait ProcessRef {
    fn process_name(&self) -> &str;
}

impl ProcessRef for str {
    fn process_name(&self) -> &str {
        self
    }
}

impl ProcessRef for String {
    fn process_name(&self) -> &str {
        self
    }
}

/// A watched process and the PID it had when watching started
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessIdentity {
    pub name: String,
    pub pid: u32,
}

/// What went wrong with a watched process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Nothing runs under the name anymore
    Died,
    /// Something runs under the name, but not (only) the original PID
    Restarted { new_pids: Vec<u32> },
}

/// A watched process found dead or restarted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LivenessViolation {
    pub name: String,
    pub old_pid: u32,
    pub kind: ViolationKind,
}

impl fmt::Display for LivenessViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ViolationKind::Died => write!(f, "{} died (PID={})", self.name, self.old_pid),
            ViolationKind::Restarted { new_pids } => write!(
                f,
                "{} restarted (PID={} -> {:?})",
                self.name, self.old_pid, new_pids
            ),
        }
    }
}

/// Registry of watched processes for one story run
pub struct ProcessWatcher {
    device: Arc<dyn Device>,
    retry: RetryPolicy,
    process_pid: BTreeMap<String, u32>,
}

impl ProcessWatcher {
    pub fn new(device: Arc<dyn Device>, retry: RetryPolicy) -> Self {
        Self {
            device,
            retry,
            process_pid: BTreeMap::new(),
        }
    }

    /// Register a process or app and record its PID
    ///
    /// Waits, within the retry budget, for the process to show up. Fails if
    /// the name is already watched, if the process never appears, or if more
    /// than one process runs under the name.
    pub async fn start_watching<P>(&mut self, target: &P) -> Result<ProcessIdentity>
    where
        P: ProcessRef + ?Sized,
    {
        let name = target.process_name().to_string();

        if self.process_pid.contains_key(&name) {
            tracing::error!("Process {} is already being watched", name);
            return Err(Error::AlreadyWatching(name));
        }

        let device = self.device.as_ref();
        let what = format!("PID of {}", name);
        let pids = self
            .retry
            .poll(&what, || async {
                let status = device.process_status().await?;
                Ok::<_, Error>(status.pids(&name).to_vec())
            })
            .await
            .map_err(|e| match e {
                Error::RetryExhausted { .. } => {
                    tracing::error!("PID for {} not found", name);
                    Error::ProcessNotFound { name: name.clone() }
                }
                other => other,
            })?;

        let pid = match pids.as_slice() {
            [pid] => *pid,
            _ => {
                tracing::error!("Single PID for {} expected, but found: {:?}", name, pids);
                return Err(Error::AmbiguousProcess { name, pids });
            }
        };

        tracing::info!("Started watching {} (PID={})", name, pid);
        self.process_pid.insert(name.clone(), pid);
        Ok(ProcessIdentity { name, pid })
    }

    /// Check that every watched process is still alive and was not restarted
    ///
    /// Takes a single process snapshot; there is no retry here.
    pub async fn assert_all_alive(&self) -> Result<()> {
        let status = self.device.process_status().await?;
        let mut violations = Vec::new();

        for (name, &old_pid) in &self.process_pid {
            let new_pids = status.pids(name);
            if new_pids.is_empty() {
                tracing::error!("Process {} died (PID={}).", name, old_pid);
                violations.push(LivenessViolation {
                    name: name.clone(),
                    old_pid,
                    kind: ViolationKind::Died,
                });
            } else if new_pids != [old_pid] {
                tracing::error!(
                    "Process {} restarted (PID={} -> {:?}).",
                    name,
                    old_pid,
                    new_pids
                );
                violations.push(LivenessViolation {
                    name: name.clone(),
                    old_pid,
                    kind: ViolationKind::Restarted {
                        new_pids: new_pids.to_vec(),
                    },
                });
            } else {
                tracing::info!("Process {} still alive (PID={})", name, old_pid);
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::ProcessesNotAlive(violations))
        }
    }

    /// Watched processes, sorted by name
    pub fn watched(&self) -> impl Iterator<Item = ProcessIdentity> + '_ {
        self.process_pid.iter().map(|(name, &pid)| ProcessIdentity {
            name: name.clone(),
            pid,
        })
    }

    pub fn is_watching(&self, name: &str) -> bool {
        self.process_pid.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.process_pid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.process_pid.is_empty()
    }
}
