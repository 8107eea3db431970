//! Story runner
//!
//! Drives one story through `Provisioning -> Executing -> Verifying` and
//! ends in `Done` or `Failed`. The trace brackets everything between
//! provisioning and the end of verification.

use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::common::{Error, Result};
use crate::device::{Actions, Device};
use crate::setup::{
    ensure_single_browser, AndroidApp, BrowserApp, BrowserVariant, GenericApp, ProvisionOptions,
};

use super::retry::RetryPolicy;
use super::story::{StoryScript, StoryStep, WatchTarget};
use super::trace::{StartupTraceRecorder, TraceRecorder, TraceRequest, DEFAULT_TRACE_DURATION};
use super::watcher::ProcessWatcher;

/// Where a story run is, or where it ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryPhase {
    Provisioning,
    Executing,
    Verifying,
    Done,
    Failed,
}

impl fmt::Display for StoryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoryPhase::Provisioning => "provisioning",
            StoryPhase::Executing => "executing",
            StoryPhase::Verifying => "verifying",
            StoryPhase::Done => "done",
            StoryPhase::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Result of a story run
#[derive(Debug, Clone, Serialize)]
pub struct StoryReport {
    pub name: String,
    pub phase: StoryPhase,
    /// Phase the run was in when it failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_in: Option<StoryPhase>,
    pub steps_run: usize,
    pub steps_total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<PathBuf>,
}

impl StoryReport {
    fn new(script: &StoryScript) -> Self {
        Self {
            name: script.name.clone(),
            phase: StoryPhase::Provisioning,
            failed_in: None,
            steps_run: 0,
            steps_total: script.steps.len(),
            error: None,
            trace: None,
        }
    }

    pub fn passed(&self) -> bool {
        self.phase == StoryPhase::Done
    }

    fn fail(&mut self, error: &Error) {
        self.failed_in = Some(self.phase);
        self.phase = StoryPhase::Failed;
        self.error = Some(error.to_string());
    }
}

/// How a story is run
#[derive(Debug, Clone)]
pub struct StoryOptions {
    pub browser: BrowserVariant,
    pub provision: ProvisionOptions,
    /// Local port forwarded to the browser's devtools socket
    pub devtools_port: Option<u16>,
    pub trace_output: PathBuf,
    /// How long the browser traces after it starts
    pub trace_duration: Duration,
    pub retry: RetryPolicy,
    pub verbose: bool,
}

impl Default for StoryOptions {
    fn default() -> Self {
        Self {
            browser: BrowserVariant::default(),
            provision: ProvisionOptions::default(),
            devtools_port: None,
            trace_output: PathBuf::from("trace.json"),
            trace_duration: DEFAULT_TRACE_DURATION,
            retry: RetryPolicy::default(),
            verbose: false,
        }
    }
}

/// Runs one story against one device
pub struct StoryRunner {
    device: Arc<dyn Device>,
    script: StoryScript,
    options: StoryOptions,
    recorder: Option<Box<dyn TraceRecorder>>,
}

impl StoryRunner {
    pub fn new(device: Arc<dyn Device>, script: StoryScript, options: StoryOptions) -> Self {
        Self {
            device,
            script,
            options,
            recorder: None,
        }
    }

    /// Capture the trace with `recorder` instead of Chrome startup tracing
    pub fn with_trace_recorder(mut self, recorder: Box<dyn TraceRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Run the story
    ///
    /// Provisioning, step and verification failures end the run as
    /// [`StoryPhase::Failed`] in the returned report. Errors while preparing
    /// the device for the story (stopping apps, forwarding ports, starting
    /// the trace) are returned as `Err`.
    pub async fn run(self) -> Result<StoryReport> {
        let StoryRunner {
            device,
            script,
            options,
            recorder,
        } = self;
        let mut report = StoryReport::new(&script);

        println!(
            "\n{} {}",
            "Running Story:".blue().bold(),
            script.name.white().bold()
        );
        if let Some(desc) = &script.description {
            println!("  {}", desc.dimmed());
        }

        // Provisioning
        println!("\n{}", "Provisioning:".cyan());
        let mut browser =
            match ensure_single_browser(device.clone(), options.browser, &options.provision).await {
                Ok(browser) => browser,
                Err(e) => {
                    println!("  {} {}", "✗".red(), e);
                    report.fail(&e);
                    print_summary(&report);
                    return Ok(report);
                }
            };
        println!(
            "  {} {} is the only browser available",
            "✓".green(),
            browser.package_name()
        );
        if let Some(port) = options.devtools_port {
            browser.set_devtools_port(port);
        }

        let mut recorder: Box<dyn TraceRecorder> = match recorder {
            Some(recorder) => recorder,
            None => Box::new(StartupTraceRecorder::new(
                device.clone(),
                &browser,
                options.trace_duration,
                options.retry.clone(),
            )),
        };
        let mut session =
            Session::new(device.clone(), &script, browser, options.retry.clone());

        // Every launch during the story has to start a fresh process
        session.stop_apps().await?;
        session.browser.forward_devtools().await?;

        let request = TraceRequest::new(&options.trace_output);
        if options.verbose {
            println!("  Flags: {}", request.flags.join(" ").dimmed());
            println!("  Trace: {}", request.output.display().to_string().dimmed());
            if let Some(port) = session.browser.devtools_port() {
                println!("  Devtools: {}", format!("localhost:{}", port).dimmed());
            }
        }
        recorder.start(&request).await?;

        // Executing
        report.phase = StoryPhase::Executing;
        println!("\n{}", "Steps:".cyan());
        for (i, step) in script.steps.iter().enumerate() {
            let step_num = i + 1;
            report.steps_run = step_num;
            match session.execute_step(step).await {
                Ok(()) => println!(
                    "  {} Step {}: {}",
                    "✓".green(),
                    step_num,
                    step.to_string().dimmed()
                ),
                Err(e) => {
                    println!("  {} Step {}: {}", "✗".red(), step_num, e);
                    report.fail(&e);
                    break;
                }
            }
        }

        // Verifying
        if report.phase == StoryPhase::Executing {
            report.phase = StoryPhase::Verifying;
            println!("\n{}", "Verifying:".cyan());
            match session.watcher.assert_all_alive().await {
                Ok(()) => {
                    for identity in session.watcher.watched() {
                        println!(
                            "  {} {} still alive (PID={})",
                            "✓".green(),
                            identity.name,
                            identity.pid
                        );
                    }
                    report.phase = StoryPhase::Done;
                }
                Err(e) => {
                    println!("  {} {}", "✗".red(), e);
                    report.fail(&e);
                }
            }
        }

        // The trace is collected whatever the outcome
        match recorder.stop().await {
            Ok(trace) => report.trace = trace,
            Err(e) => tracing::warn!("Failed to collect trace: {}", e),
        }
        if let Err(e) = session.stop_apps().await {
            tracing::warn!("Failed to stop apps after the story: {}", e);
        }

        print_summary(&report);
        Ok(report)
    }
}

/// State of one run between provisioning and cleanup
struct Session {
    browser: BrowserApp,
    /// Apps declared by the script, by alias
    apps: BTreeMap<String, GenericApp>,
    actions: Actions,
    watcher: ProcessWatcher,
}

impl Session {
    fn new(
        device: Arc<dyn Device>,
        script: &StoryScript,
        browser: BrowserApp,
        retry: RetryPolicy,
    ) -> Self {
        let apps = script
            .apps
            .iter()
            .map(|(alias, package)| {
                let app = GenericApp::new(device.clone(), package.clone());
                (alias.clone(), app)
            })
            .collect();
        Self {
            browser,
            apps,
            actions: Actions::new(device.clone(), retry.clone()),
            watcher: ProcessWatcher::new(device, retry),
        }
    }

    async fn stop_apps(&self) -> Result<()> {
        self.browser.force_stop().await?;
        for app in self.apps.values() {
            app.force_stop().await?;
        }
        Ok(())
    }

    async fn execute_step(&mut self, step: &StoryStep) -> Result<()> {
        tracing::debug!("Executing step: {}", step);
        match step {
            StoryStep::StartActivity { uri } => self.actions.start_activity(uri).await,
            StoryStep::TapUiElement { selector } => self.actions.tap_ui_element(selector).await,
            StoryStep::Swipe { direction, repeat } => self.actions.swipe(*direction, *repeat).await,
            StoryStep::GoBack => self.actions.go_back().await,
            StoryStep::Wait { secs } => {
                tokio::time::sleep(Duration::from_secs(*secs)).await;
                Ok(())
            }
            StoryStep::StartWatching { target } => {
                match target {
                    WatchTarget::Browser => self.watcher.start_watching(&self.browser).await?,
                    WatchTarget::App(alias) => {
                        let app = self.apps.get(alias).ok_or_else(|| {
                            Error::Config(format!("Unknown app '{}' in watch target", alias))
                        })?;
                        self.watcher.start_watching(app).await?
                    }
                    WatchTarget::Process(name) => self.watcher.start_watching(name.as_str()).await?,
                };
                Ok(())
            }
            StoryStep::AssertAllAlive => self.watcher.assert_all_alive().await,
        }
    }
}

fn print_summary(report: &StoryReport) {
    if report.passed() {
        println!("\n{} {}\n", "✓".green().bold(), "Story Passed".green().bold());
    } else {
        let phase = report.failed_in.unwrap_or(report.phase);
        println!(
            "\n{} {} {}\n",
            "✗".red().bold(),
            "Story Failed".red().bold(),
            format!("({})", phase).dimmed()
        );
    }
    if let Some(trace) = &report.trace {
        println!("  Trace: {}", trace.display());
    }
}
