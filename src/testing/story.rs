//! Story scripts
//!
//! A story is a named, ordered list of UI steps. Scripts are either built in
//! or loaded from YAML files:
//!
//! ```yaml
//! name: twitter_flipkart
//! apps:
//!   twitter: com.twitter.android
//! steps:
//!   - action: start_activity
//!     uri: https://twitter.com/flipkart
//!   - action: start_watching
//!     target: app:twitter
//!   - action: swipe
//!     direction: up
//!     repeat: 3
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::common::{Error, Result};
use crate::device::actions::{SwipeDirection, UiSelector};

/// What a `start_watching` step registers
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum WatchTarget {
    /// The provisioned browser
    Browser,
    /// An app declared in the script's `apps` table, by alias
    App(String),
    /// Any process, by its exact name
    Process(String),
}

impl FromStr for WatchTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Config("Empty watch target".to_string()));
        }
        if s == "browser" {
            return Ok(WatchTarget::Browser);
        }
        match s.strip_prefix("app:") {
            Some("") => Err(Error::Config(format!("Missing app alias in '{}'", s))),
            Some(alias) => Ok(WatchTarget::App(alias.to_string())),
            None => Ok(WatchTarget::Process(s.to_string())),
        }
    }
}

impl TryFrom<String> for WatchTarget {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchTarget::Browser => write!(f, "browser"),
            WatchTarget::App(alias) => write!(f, "app:{}", alias),
            WatchTarget::Process(name) => write!(f, "{}", name),
        }
    }
}

/// A single step of a story
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StoryStep {
    /// Open a URI with the VIEW intent
    StartActivity { uri: String },
    /// Tap the first on-screen element matching every attribute
    TapUiElement { selector: UiSelector },
    Swipe {
        direction: SwipeDirection,
        #[serde(default = "default_repeat")]
        repeat: u32,
    },
    GoBack,
    /// Sleep, e.g. to let a page load
    Wait { secs: u64 },
    /// Record the single PID of a process for the liveness check
    StartWatching { target: WatchTarget },
    /// Check that every watched process still runs with its recorded PID
    AssertAllAlive,
}

fn default_repeat() -> u32 {
    1
}

impl fmt::Display for StoryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoryStep::StartActivity { uri } => write!(f, "start activity {}", uri),
            StoryStep::TapUiElement { selector } => write!(f, "tap {}", selector),
            StoryStep::Swipe { direction, repeat } => {
                let direction = match direction {
                    SwipeDirection::Up => "up",
                    SwipeDirection::Down => "down",
                };
                write!(f, "swipe {} x{}", direction, repeat)
            }
            StoryStep::GoBack => write!(f, "go back"),
            StoryStep::Wait { secs } => write!(f, "wait {}s", secs),
            StoryStep::StartWatching { target } => write!(f, "start watching {}", target),
            StoryStep::AssertAllAlive => write!(f, "assert all alive"),
        }
    }
}

/// A complete story loaded from YAML or built in
#[derive(Debug, Clone, Deserialize)]
pub struct StoryScript {
    pub name: String,
    pub description: Option<String>,
    /// Alias -> package name of the apps the story drives
    #[serde(default)]
    pub apps: BTreeMap<String, String>,
    pub steps: Vec<StoryStep>,
}

impl StoryScript {
    /// Load and validate a story from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let script: StoryScript = serde_yaml::from_str(content)?;
        script.validate()?;
        Ok(script)
    }

    /// Every `app:` watch target must name an app declared in `apps`
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::Config(format!("Story '{}' has no steps", self.name)));
        }
        for step in &self.steps {
            if let StoryStep::StartWatching {
                target: WatchTarget::App(alias),
            } = step
            {
                if !self.apps.contains_key(alias) {
                    return Err(Error::Config(format!(
                        "Story '{}' watches unknown app '{}'. Declared apps: {}",
                        self.name,
                        alias,
                        self.apps.keys().cloned().collect::<Vec<_>>().join(", ")
                    )));
                }
            }
        }
        Ok(())
    }

    /// Package name behind an app alias
    pub fn app_package(&self, alias: &str) -> Option<&str> {
        self.apps.get(alias).map(String::as_str)
    }

    /// Open @flipkart on Twitter, follow the link to flipkart.com into the
    /// browser, scroll the page and come back to Twitter.
    ///
    /// The closing liveness check is left to the runner.
    pub fn twitter_flipkart(page_load_wait_secs: u64) -> Self {
        Self {
            name: "twitter_flipkart".to_string(),
            description: Some(
                "Tap a link in the Twitter app and check that neither Twitter \
                 nor the browser gets killed"
                    .to_string(),
            ),
            apps: BTreeMap::from([("twitter".to_string(), "com.twitter.android".to_string())]),
            steps: vec![
                StoryStep::StartActivity {
                    uri: "https://twitter.com/flipkart".to_string(),
                },
                StoryStep::StartWatching {
                    target: WatchTarget::App("twitter".to_string()),
                },
                StoryStep::TapUiElement {
                    selector: UiSelector::new([
                        ("package", "com.twitter.android"),
                        ("class", "android.widget.TextView"),
                        ("text", "flipkart.com"),
                    ]),
                },
                StoryStep::StartWatching {
                    target: WatchTarget::Browser,
                },
                StoryStep::Wait {
                    secs: page_load_wait_secs,
                },
                StoryStep::Swipe {
                    direction: SwipeDirection::Up,
                    repeat: 3,
                },
                StoryStep::GoBack,
            ],
        }
    }
}
