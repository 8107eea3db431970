//! Polling with bounded retries
//!
//! Device queries lag behind the actions that change device state: an app
//! that was just launched may not show up in `ps` for a second or two. The
//! [`RetryPolicy`] treats an empty answer as "not there yet" and asks again
//! with exponential backoff until something shows up or the attempt budget
//! runs out.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::common::config::RetryConfig;
use crate::common::{Error, Result};

/// Values that can be "not available yet"
pub trait Availability {
    fn is_available(&self) -> bool;
}

impl<T> Availability for Vec<T> {
    fn is_available(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> Availability for Option<T> {
    fn is_available(&self) -> bool {
        self.is_some()
    }
}

impl Availability for bool {
    fn is_available(&self) -> bool {
        *self
    }
}

impl Availability for String {
    fn is_available(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> Availability for BTreeSet<T> {
    fn is_available(&self) -> bool {
        !self.is_empty()
    }
}

impl<T, S> Availability for HashSet<T, S> {
    fn is_available(&self) -> bool {
        !self.is_empty()
    }
}

impl<K, V> Availability for BTreeMap<K, V> {
    fn is_available(&self) -> bool {
        !self.is_empty()
    }
}

impl<K, V, S> Availability for HashMap<K, V, S> {
    fn is_available(&self) -> bool {
        !self.is_empty()
    }
}

/// Retry policy for device queries
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first try (minimum 1)
    pub attempts: u32,
    /// Delay after the first unsuccessful attempt
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after every attempt
    pub backoff: u32,
    /// Maximum delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 6,
            initial_delay: Duration::from_secs(1),
            backoff: 2,
            max_delay: Duration::from_secs(8),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            attempts: config.attempts,
            initial_delay: config.initial_delay(),
            backoff: config.backoff,
            max_delay: config.max_delay(),
        }
    }
}

impl RetryPolicy {
    /// A policy without delays, for tests and fast local devices
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            initial_delay: Duration::ZERO,
            backoff: 1,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after the given attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let multiplier = self
            .backoff
            .max(1)
            .saturating_pow(attempt.max(1).saturating_sub(1));
        self.initial_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }

    fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    /// Poll `query` until it returns an available value
    ///
    /// Unavailable values are retried; errors returned by the query are not
    /// and propagate immediately. Fails with [`Error::RetryExhausted`] when
    /// no attempt produced an available value.
    pub async fn poll<F, Fut, T>(&self, what: &str, mut query: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        T: Availability,
    {
        let max_attempts = self.max_attempts();

        for attempt in 1..=max_attempts {
            let value = query().await?;
            if value.is_available() {
                return Ok(value);
            }
            if attempt < max_attempts {
                let delay = self.delay_after(attempt);
                tracing::info!(
                    "Retrying {} (attempt {}/{} not available). Waiting {:?}...",
                    what,
                    attempt,
                    max_attempts,
                    delay
                );
                sleep(delay).await;
            }
        }

        Err(Error::RetryExhausted {
            what: what.to_string(),
            attempts: max_attempts,
        })
    }
}
