//! Story execution
//!
//! Runs user stories against a provisioned device and checks that the
//! processes the story touched were neither killed nor restarted along the
//! way. Waiting on device state goes through [`RetryPolicy`], liveness
//! tracking through [`ProcessWatcher`].

pub mod retry;
pub mod runner;
pub mod story;
pub mod trace;
pub mod watcher;

pub use retry::{Availability, RetryPolicy};
pub use runner::{StoryOptions, StoryPhase, StoryReport, StoryRunner};
pub use story::{StoryScript, StoryStep, WatchTarget};
pub use trace::{StartupTraceRecorder, TraceRecorder, TraceRequest};
pub use watcher::{ProcessRef, ProcessWatcher};
