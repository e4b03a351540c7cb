//! Retry helpers for remote calls.
//!
//! `retry_async` re-runs an operation while it fails with a retriable error,
//! sleeping between attempts according to a [`BackoffStrategy`].

use crate::{ErrorEnvelope, RequestContext, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same delay every time.
    Constant,
    /// `base * attempt`.
    #[default]
    Linear,
    /// `base * 2^(attempt - 1)`.
    Exponential,
}

impl BackoffStrategy {
    /// Parse a strategy name (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "constant" => Some(Self::Constant),
            "linear" => Some(Self::Linear),
            "exponential" => Some(Self::Exponential),
            _ => None,
        }
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Linear => "linear",
            Self::Exponential => "exponential",
        }
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts (including the first try).
    pub max_attempts: u32,
    /// Base delay for backoff in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter ratio as percentage (0..=100).
    pub jitter_ratio_pct: u32,
    /// Delay growth between attempts.
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_ratio_pct: 0,
            strategy: BackoffStrategy::Linear,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_ratio_pct: 0,
            strategy: BackoffStrategy::Constant,
        }
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    #[must_use]
    pub fn base_delay_for(self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let millis = match self.strategy {
            BackoffStrategy::Constant => self.base_delay_ms,
            BackoffStrategy::Linear => self.base_delay_ms.saturating_mul(u64::from(attempt)),
            BackoffStrategy::Exponential => {
                let pow = attempt.saturating_sub(1).min(30);
                self.base_delay_ms.saturating_mul(1u64 << pow)
            },
        };
        Duration::from_millis(millis.min(self.max_delay_ms))
    }
}

/// Retry a fallible async operation while its errors are retriable.
pub async fn retry_async<T, F, Fut>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_async_with_observer(ctx, policy, operation, &mut op, |_, _| {}).await
}

/// Retry with a callback invoked before each retry.
pub async fn retry_async_with_observer<T, F, Fut, Obs>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &'static str,
    op: &mut F,
    mut on_retry: Obs,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    Obs: FnMut(u32, &ErrorEnvelope),
{
    let mut attempt = 0u32;

    loop {
        attempt = attempt.saturating_add(1);
        ctx.ensure_not_cancelled(operation)?;

        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.is_retriable() || attempt >= policy.max_attempts {
                    return Err(error.with_metadata("attempts", attempt.to_string()));
                }

                on_retry(attempt, &error);
                sleep_with_cancellation(ctx, jittered(policy, attempt), operation).await?;
            },
        }
    }
}

fn jittered(policy: RetryPolicy, attempt: u32) -> Duration {
    let delay = policy.base_delay_for(attempt);
    let jitter_pct = u64::from(policy.jitter_ratio_pct.min(100));
    if jitter_pct == 0 {
        return delay;
    }
    let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    let range = millis.saturating_mul(jitter_pct) / 100;
    if range == 0 {
        return delay;
    }
    // Symmetric offset in [-range, +range].
    let offset = jitter_seed(attempt) % range.saturating_mul(2).saturating_add(1);
    let jittered = millis
        .saturating_add(offset)
        .saturating_sub(range)
        .min(policy.max_delay_ms);
    Duration::from_millis(jittered)
}

fn jitter_seed(attempt: u32) -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| u64::from(duration.subsec_nanos()));
    nanos ^ u64::from(attempt).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

async fn sleep_with_cancellation(
    ctx: &RequestContext,
    delay: Duration,
    operation: &'static str,
) -> Result<()> {
    tokio::select! {
        () = ctx.cancelled() => Err(ErrorEnvelope::cancelled("operation cancelled").with_operation(operation)),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}
