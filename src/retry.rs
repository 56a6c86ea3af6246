//! Fixed-delay retry of rate-limited Gmail calls.

use crate::config::DEFAULT_BACKOFF;
use crate::errors::{GmailApiError, GmailResult};
use async_trait::async_trait;
use log::warn;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

/// Suspends the current task. Injected so tests can observe delays without waiting.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

/// Retries only on `RateLimitError`, waiting `delay` between attempts.
/// `max_attempts: None` retries until the call stops being rate limited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_BACKOFF)
    }
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    /// `attempt` is the 1-based number of the attempt that just failed.
    pub fn should_retry(&self, attempt: u32, error: &GmailApiError) -> bool {
        if !error.is_rate_limit() {
            return false;
        }
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }

    pub async fn run<T, F, Fut>(&self, sleeper: &dyn Sleeper, label: &str, mut op: F) -> GmailResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GmailResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(err) if self.should_retry(attempt, &err) => {
                    warn!(
                        "{} rate limited (attempt {}), retrying in {:?}",
                        label, attempt, self.delay
                    );
                    sleeper.sleep(self.delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
