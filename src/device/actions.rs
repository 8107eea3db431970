//! UI actions performed on the device
//!
//! Thin wrappers around `am`, `input` and `uiautomator`. Each call blocks
//! until the device shell returns.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::common::{Error, Result};
use crate::testing::retry::RetryPolicy;

use super::parse::{parse_screen_size, parse_ui_nodes, UiNode};
use super::Device;

/// Where uiautomator writes its hierarchy dump
const UI_DUMP_PATH: &str = "/data/local/tmp/ui_dump.xml";

/// Duration of a single swipe gesture
const SWIPE_DURATION: Duration = Duration::from_millis(300);

/// Attribute constraints identifying a UI element
///
/// An element matches when every listed attribute has exactly the given
/// value, e.g. `{package: com.twitter.android, text: flipkart.com}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UiSelector(BTreeMap<String, String>);

impl UiSelector {
    pub fn new<K, V>(attributes: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn matches(&self, node: &UiNode) -> bool {
        self.0
            .iter()
            .all(|(name, value)| node.get(name) == Some(value.as_str()))
    }
}

impl fmt::Display for UiSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={:?}", k, v)).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Swipe direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwipeDirection {
    Up,
    Down,
}

/// UI interaction primitives bound to one device
pub struct Actions {
    device: Arc<dyn Device>,
    retry: RetryPolicy,
}

impl Actions {
    pub fn new(device: Arc<dyn Device>, retry: RetryPolicy) -> Self {
        Self { device, retry }
    }

    /// Open a URI with the VIEW intent; Android picks the app that handles it
    pub async fn start_activity(&self, uri: &str) -> Result<()> {
        tracing::info!("Starting activity for {}", uri);
        self.device
            .run_shell_command(&[
                "am",
                "start",
                "-W",
                "-a",
                "android.intent.action.VIEW",
                "-d",
                uri,
            ])
            .await?;
        Ok(())
    }

    /// Tap the first on-screen element matching `selector`
    ///
    /// The screen is re-dumped until the element appears or the retry budget
    /// is spent.
    pub async fn tap_ui_element(&self, selector: &UiSelector) -> Result<()> {
        let what = format!("UI element {}", selector);
        let center = self
            .retry
            .poll(&what, || self.find_element(selector))
            .await
            .map_err(|e| match e {
                Error::RetryExhausted { .. } => {
                    tracing::error!("No UI element matching {}", selector);
                    Error::UiElementNotFound(selector.to_string())
                }
                other => other,
            })?;

        // poll only returns available values
        let Some((x, y)) = center else {
            return Err(Error::UiElementNotFound(selector.to_string()));
        };
        tracing::info!("Tapping {} at ({}, {})", selector, x, y);
        self.tap(x, y).await
    }

    async fn find_element(&self, selector: &UiSelector) -> Result<Option<(u32, u32)>> {
        let xml = self.dump_ui().await?;
        Ok(parse_ui_nodes(&xml)
            .iter()
            .find(|node| selector.matches(node))
            .and_then(UiNode::center))
    }

    /// Dump the current UI hierarchy as XML
    pub async fn dump_ui(&self) -> Result<String> {
        self.device
            .run_shell_command(&["uiautomator", "dump", UI_DUMP_PATH])
            .await?;
        self.device.run_shell_command(&["cat", UI_DUMP_PATH]).await
    }

    pub async fn tap(&self, x: u32, y: u32) -> Result<()> {
        let (x, y) = (x.to_string(), y.to_string());
        self.device
            .run_shell_command(&["input", "tap", &x, &y])
            .await?;
        Ok(())
    }

    /// Swipe across the middle half of the screen, `repeat` times
    pub async fn swipe(&self, direction: SwipeDirection, repeat: u32) -> Result<()> {
        let (width, height) = self.screen_size().await?;
        let x = width / 2;
        let (from, to) = match direction {
            SwipeDirection::Up => (height * 3 / 4, height / 4),
            SwipeDirection::Down => (height / 4, height * 3 / 4),
        };
        let (x, from, to) = (x.to_string(), from.to_string(), to.to_string());
        let duration = SWIPE_DURATION.as_millis().to_string();

        for _ in 0..repeat {
            self.device
                .run_shell_command(&["input", "swipe", &x, &from, &x, &to, &duration])
                .await?;
        }
        Ok(())
    }

    pub async fn swipe_up(&self, repeat: u32) -> Result<()> {
        self.swipe(SwipeDirection::Up, repeat).await
    }

    pub async fn swipe_down(&self, repeat: u32) -> Result<()> {
        self.swipe(SwipeDirection::Down, repeat).await
    }

    pub async fn go_back(&self) -> Result<()> {
        self.device
            .run_shell_command(&["input", "keyevent", "KEYCODE_BACK"])
            .await?;
        Ok(())
    }

    async fn screen_size(&self) -> Result<(u32, u32)> {
        let output = self.device.run_shell_command(&["wm", "size"]).await?;
        parse_screen_size(&output).ok_or_else(|| {
            Error::Internal(format!("Unexpected 'wm size' output: {}", output.trim()))
        })
    }
}
