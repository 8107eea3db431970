//! Command-line tests that need no attached device
//!
//! Every test runs the binary with its own XDG config and data directories
//! so a config file on the host cannot leak in.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Isolated environment for one invocation of the binary
struct TestContext {
    temp_dir: TempDir,
}

/// Captured output of a run
struct CliOutput {
    stdout: String,
    stderr: String,
    code: Option<i32>,
}

impl TestContext {
    fn new() -> Self {
        Self {
            temp_dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    fn config_home(&self) -> PathBuf {
        self.path().join("config")
    }

    /// Write the user config file
    fn create_config(&self, content: &str) {
        let config_path = self.config_home().join("android-stories").join("config.toml");
        fs::create_dir_all(config_path.parent().unwrap()).expect("Failed to create config dir");
        fs::write(&config_path, content).expect("Failed to write config");
    }

    fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    fn run(&self, args: &[&str]) -> CliOutput {
        let output = Command::new(env!("CARGO_BIN_EXE_android-stories"))
            .args(args)
            .env("XDG_CONFIG_HOME", self.config_home())
            .env("XDG_DATA_HOME", self.path().join("data"))
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to run android-stories");

        CliOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            code: output.status.code(),
        }
    }

    fn run_ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert_eq!(
            output.code,
            Some(0),
            "Command {:?} failed:\nstdout: {}\nstderr: {}",
            args,
            output.stdout,
            output.stderr
        );
        output.stdout
    }
}

#[test]
fn test_help_lists_commands() {
    let ctx = TestContext::new();
    let stdout = ctx.run_ok(&["--help"]);

    for command in ["run", "provision", "browsers", "devices"] {
        assert!(stdout.contains(command), "missing '{}' in help:\n{}", command, stdout);
    }
}

#[test]
fn test_browsers_listing() {
    let ctx = TestContext::new();
    let stdout = ctx.run_ok(&["browsers"]);

    assert!(stdout.contains("android-chrome (default)"));
    assert!(stdout.contains("org.chromium.chrome"));
    assert!(stdout.contains("com.android.chrome"));
}

#[test]
fn test_browsers_json() {
    let ctx = TestContext::new();
    let stdout = ctx.run_ok(&["browsers", "--json"]);

    let listing: serde_json::Value = serde_json::from_str(&stdout).expect("invalid JSON");
    let entries = listing.as_array().expect("expected an array");
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["id"], "android-chrome");
    assert_eq!(entries[0]["apk"], "Chrome.apk");
    assert_eq!(entries[0]["default"], true);
    assert!(entries[2].get("apk").is_none());
}

#[test]
fn test_unknown_browser_flag_is_rejected() {
    let ctx = TestContext::new();
    let output = ctx.run(&["run", "--browser", "firefox"]);

    assert_eq!(output.code, Some(2));
    assert!(output.stderr.contains("firefox"));
    assert!(output.stderr.contains("android-chromium"));
}

#[test]
fn test_unknown_browser_in_config() {
    let ctx = TestContext::new();
    ctx.create_config("[browser]\ndefault = \"firefox\"\n");

    let output = ctx.run(&["provision"]);

    assert_eq!(output.code, Some(1));
    assert!(output.stderr.contains("Unknown browser 'firefox'"));
}

#[test]
fn test_invalid_config_is_reported() {
    let ctx = TestContext::new();
    ctx.create_config("[retry]\nattempts = 0\n");

    let output = ctx.run(&["browsers"]);

    assert_eq!(output.code, Some(1));
    assert!(output.stderr.contains("retry.attempts must be at least 1"));
}

#[test]
fn test_missing_script_file() {
    let ctx = TestContext::new();
    let missing = ctx.path().join("missing.yaml");

    let output = ctx.run(&["run", "--script", missing.to_str().unwrap()]);

    assert_eq!(output.code, Some(1));
    assert!(output.stderr.contains("Failed to read file"));
    assert!(output.stderr.contains("missing.yaml"));
}

#[test]
fn test_script_with_unknown_app() {
    let ctx = TestContext::new();
    let script = ctx.write_file(
        "story.yaml",
        "name: broken\nsteps:\n  - action: start_watching\n    target: app:maps\n",
    );

    let output = ctx.run(&["run", "--script", script.to_str().unwrap()]);

    assert_eq!(output.code, Some(1));
    assert!(output.stderr.contains("unknown app 'maps'"));
}

#[test]
fn test_missing_adb_binary() {
    let ctx = TestContext::new();
    let adb = ctx.path().join("platform-tools").join("adb");

    let output = ctx.run(&["devices", "--adb-bin", adb.to_str().unwrap()]);

    assert_eq!(output.code, Some(1));
    assert!(output.stderr.contains("not found"));
}

#[test]
fn test_zero_retry_attempts_rejected() {
    let ctx = TestContext::new();
    let output = ctx.run(&["run", "--retry-attempts", "0"]);

    assert_eq!(output.code, Some(1));
    assert!(output.stderr.contains("--retry-attempts must be at least 1"));
}

#[test]
fn test_apks_dir_default_is_documented() {
    let ctx = TestContext::new();
    let stdout = ctx.run_ok(&["provision", "--help"]);

    assert!(stdout.contains("--apks-dir"));
    assert!(stdout.contains("out/Release/apks"));
}
