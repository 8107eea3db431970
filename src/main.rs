//! android-stories - run Android user stories and catch killed processes
//!
//! Provisions a single browser on the device, drives a scripted user story
//! through adb and fails when any watched process died or was restarted.

use clap::Parser;
use stories::cli::{self, Outcome};
use stories::commands::Commands;
use stories::common::logging;

#[derive(Parser)]
#[command(
    name = "android-stories",
    about = "Run Android user stories and check that no watched process gets killed"
)]
#[command(version, long_about = None)]
struct Cli {
    /// Log progress to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Dropped before exiting so buffered log lines reach the file
    let log_guard = logging::init_cli(cli.verbose);

    let code = match cli::dispatch(cli.command, cli.verbose).await {
        Ok(Outcome::Success) => 0,
        Ok(Outcome::StoryFailed) => 1,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {e}");
            1
        }
    };

    if code != 0 && log_guard.is_some() {
        if let Some(path) = logging::log_file_path() {
            eprintln!("Log file: {}", path.display());
        }
    }

    drop(log_guard);
    std::process::exit(code);
}
