// SPDX-License-Identifier: MIT OR Apache-2.0
//! Exponential-backoff retry.

use one_error::{OneError, Result};
use std::time::Duration;
use tracing::debug;

/// Backoff parameters.
#[derive(Debug, Clone, Copy)]
pub struct RetryOptions {
    /// Delay before the first retry.
    pub delay: Duration,
    /// Factor applied to the delay after each attempt.
    pub delay_multiplier: f64,
    /// Maximum number of retries after the initial attempt.
    pub retries: u32,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(50),
            delay_multiplier: 2.0,
            retries: 3,
        }
    }
}

/// Run `op`, retrying with exponential backoff while `should_retry` allows.
///
/// The first error `should_retry` rejects — or the error of the final
/// attempt — is returned unchanged.
///
/// # Errors
///
/// Whatever `op` last failed with.
pub async fn retry<T, F, Fut>(
    options: &RetryOptions,
    should_retry: impl Fn(&OneError) -> bool,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = options.delay;
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= options.retries || !should_retry(&err) {
                    return Err(err);
                }
                attempt += 1;
                debug!(code = err.code(), attempt, delay_ms = delay.as_millis() as u64, "retrying");
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(options.delay_multiplier);
            }
        }
    }
}
