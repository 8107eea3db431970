//! android-stories - Android user-story test driver
//!
//! Makes exactly one Chrome variant available on a device, runs a scripted
//! user story against it while capturing a trace, and asserts that every
//! process the story registered is still alive with its original PID.

pub mod cli;
pub mod commands;
pub mod common;
pub mod device;
pub mod setup;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use device::{AdbDevice, Device};
pub use testing::{StoryReport, StoryRunner, StoryScript};
