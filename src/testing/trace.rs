//! Trace capture around a story
//!
//! The runner only brackets the story with [`TraceRecorder::start`] and
//! [`TraceRecorder::stop`]; flags, trace configuration and output path are
//! passed through untouched.

use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::common::{Error, Result};
use crate::device::Device;
use crate::setup::installer::{AndroidApp, BrowserApp, TRACE_CONFIG_FILE};

use super::retry::RetryPolicy;

/// Flags the browser is started with during a story
pub const BROWSER_FLAGS: &[&str] = &[
    "--enable-remote-debugging",
    "--disable-fre",
    "--no-default-browser-check",
    "--no-first-run",
];

/// Where the browser writes the startup trace on the device
pub const DEVICE_TRACE_FILE: &str = "/data/local/tmp/chrome-trace-result.json";

/// How long startup tracing stays on unless configured otherwise
pub const DEFAULT_TRACE_DURATION: Duration = Duration::from_secs(30);

/// Trace categories recorded during a story
pub fn default_trace_config() -> serde_json::Value {
    json!({
        "excludedCategories": ["*"],
        "includedCategories": ["rails", "toplevel", "startup", "blink.user_timing"],
        "memoryDumpConfig": {"triggers": []}
    })
}

pub fn default_browser_flags() -> Vec<String> {
    BROWSER_FLAGS.iter().map(|f| f.to_string()).collect()
}

/// Everything a recorder needs to start capturing
#[derive(Debug, Clone)]
pub struct TraceRequest {
    pub flags: Vec<String>,
    pub config: serde_json::Value,
    pub output: PathBuf,
}

impl TraceRequest {
    /// The default flags and categories, written to `output`
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            flags: default_browser_flags(),
            config: default_trace_config(),
            output: output.into(),
        }
    }
}

/// Captures a trace across a story run
#[async_trait]
pub trait TraceRecorder: Send + Sync {
    async fn start(&mut self, request: &TraceRequest) -> Result<()>;

    /// Stop capturing and write the artifact; returns where it went
    async fn stop(&mut self) -> Result<Option<PathBuf>>;
}

/// Chrome startup tracing
///
/// Writes the browser command-line file and Chrome's startup trace config
/// before the browser is launched. The browser traces for `duration` after
/// it starts and then writes the result file itself, so the browser has to
/// stay up until that file shows up on the device.
pub struct StartupTraceRecorder {
    device: Arc<dyn Device>,
    browser: BrowserApp,
    duration: Duration,
    retry: RetryPolicy,
    output: Option<PathBuf>,
    started: Option<Instant>,
}

impl StartupTraceRecorder {
    pub fn new(
        device: Arc<dyn Device>,
        browser: &BrowserApp,
        duration: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            device,
            browser: browser.clone(),
            duration,
            retry,
            output: None,
            started: None,
        }
    }

    fn startup_config(&self, config: &serde_json::Value) -> serde_json::Value {
        json!({
            "trace_config": config,
            "startup_duration": self.duration.as_secs().max(1),
            "result_file": DEVICE_TRACE_FILE,
        })
    }

    /// Wait for the browser to finish tracing and write the result file
    ///
    /// Tracing starts with the browser, some time after `started`; the
    /// retry budget covers that gap.
    async fn wait_for_result(&self, started: Option<Instant>) -> Result<()> {
        if let Some(started) = started {
            let deadline = started + self.duration;
            if Instant::now() < deadline {
                tracing::info!("Waiting for startup tracing to end");
                tokio::time::sleep_until(deadline).await;
            }
        }

        let device = self.device.as_ref();
        self.retry
            .poll("trace result file", || device.file_exists(DEVICE_TRACE_FILE))
            .await
            .map_err(|e| match e {
                Error::RetryExhausted { attempts, .. } => Error::Internal(format!(
                    "{} never wrote {} (checked {} times)",
                    self.browser.package_name(),
                    DEVICE_TRACE_FILE,
                    attempts
                )),
                other => other,
            })?;
        Ok(())
    }
}

#[async_trait]
impl TraceRecorder for StartupTraceRecorder {
    async fn start(&mut self, request: &TraceRequest) -> Result<()> {
        tracing::info!(
            "Starting {:?} trace capture for {} into {}",
            self.duration,
            self.browser.package_name(),
            request.output.display()
        );
        self.browser.set_command_line_flags(&request.flags).await?;

        // Stale results would be pulled as this run's trace
        self.device
            .run_shell_command(&["rm", "-f", DEVICE_TRACE_FILE])
            .await?;
        let config = serde_json::to_string(&self.startup_config(&request.config))?;
        self.device.write_text(TRACE_CONFIG_FILE, &config).await?;

        self.output = Some(request.output.clone());
        self.started = Some(Instant::now());
        Ok(())
    }

    async fn stop(&mut self) -> Result<Option<PathBuf>> {
        let Some(output) = self.output.take() else {
            return Ok(None);
        };
        let started = self.started.take();

        self.wait_for_result(started).await?;
        pull_trace(self.device.as_ref(), &output).await?;
        self.device
            .run_shell_command(&["rm", "-f", TRACE_CONFIG_FILE, DEVICE_TRACE_FILE])
            .await?;

        tracing::info!("Trace written to {}", output.display());
        Ok(Some(output))
    }
}

async fn pull_trace(device: &dyn Device, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    device.pull(DEVICE_TRACE_FILE, output).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::FakeDevice;
    use crate::setup::installer::COMMAND_LINE_FILE;
    use crate::setup::BrowserVariant;
    use tempfile::tempdir;

    const TRACE: &str = "{\"traceEvents\": []}";

    fn recorder(fake: &Arc<FakeDevice>, duration: Duration) -> StartupTraceRecorder {
        let browser =
            BrowserApp::new(BrowserVariant::AndroidChrome.info(), fake.clone(), None);
        StartupTraceRecorder::new(fake.clone(), &browser, duration, RetryPolicy::immediate(3))
    }

    #[tokio::test]
    async fn test_start_writes_flags_and_config() {
        let fake = Arc::new(FakeDevice::new());
        let mut recorder = recorder(&fake, Duration::from_secs(30));

        recorder.start(&TraceRequest::new("trace.json")).await.unwrap();

        assert_eq!(
            fake.file(COMMAND_LINE_FILE).as_deref(),
            Some(concat!(
                "_ --enable-remote-debugging --disable-fre",
                " --no-default-browser-check --no-first-run\n"
            ))
        );
        let config: serde_json::Value =
            serde_json::from_str(&fake.file(TRACE_CONFIG_FILE).unwrap()).unwrap();
        assert_eq!(config["result_file"], DEVICE_TRACE_FILE);
        assert_eq!(config["startup_duration"], 30);
        assert_eq!(config["trace_config"]["includedCategories"][0], "rails");
    }

    #[tokio::test]
    async fn test_stop_waits_for_browser_to_write_trace() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out").join("trace.json");
        // Nothing on the device yet; the browser writes the file once tracing ends
        let fake = Arc::new(
            FakeDevice::new().with_pending_file(DEVICE_TRACE_FILE, TRACE, 3),
        );
        let mut recorder = recorder(&fake, Duration::ZERO);

        recorder.start(&TraceRequest::new(&output)).await.unwrap();
        assert!(fake.file(DEVICE_TRACE_FILE).is_none());
        let written = recorder.stop().await.unwrap();

        assert_eq!(written.as_deref(), Some(output.as_path()));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), TRACE);
        assert_eq!(fake.count_commands("exists"), 3);
        assert_eq!(fake.count_commands("shell am force-stop"), 0);
    }

    #[tokio::test]
    async fn test_stop_fails_when_trace_never_appears() {
        let dir = tempdir().unwrap();
        let fake = Arc::new(FakeDevice::new());
        let mut recorder = recorder(&fake, Duration::ZERO);

        recorder
            .start(&TraceRequest::new(dir.path().join("trace.json")))
            .await
            .unwrap();
        let err = recorder.stop().await.unwrap_err();

        assert!(err.to_string().contains("never wrote"));
        assert_eq!(fake.count_commands("exists"), 3);
        assert_eq!(fake.count_commands("pull"), 0);
    }

    #[tokio::test]
    async fn test_stop_waits_out_the_trace_duration() {
        let dir = tempdir().unwrap();
        let fake = Arc::new(
            FakeDevice::new().with_pending_file(DEVICE_TRACE_FILE, TRACE, 1),
        );
        let mut recorder = recorder(&fake, Duration::from_millis(200));

        let begin = Instant::now();
        recorder
            .start(&TraceRequest::new(dir.path().join("trace.json")))
            .await
            .unwrap();
        recorder.stop().await.unwrap();

        assert!(begin.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let fake = Arc::new(FakeDevice::new());
        let mut recorder = recorder(&fake, Duration::ZERO);
        assert_eq!(recorder.stop().await.unwrap(), None);
        assert!(fake.commands().is_empty());
    }
}
