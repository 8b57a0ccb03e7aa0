use std::{fmt::Display, future::Future};

use crate::config::StreamRetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The operation returned `Ok` on the given attempt.
    Completed { attempt: u32 },
    /// The guard reported the attempt stale before another try.
    Superseded,
    /// Every attempt failed.
    Exhausted { attempts: u32 },
}

/// Runs `op` until it succeeds or `config.max_attempts` tries have failed,
/// sleeping `config.delay()` between tries. `is_current` is consulted before
/// every try; once it returns false the loop stops without spending an
/// attempt.
pub async fn retry_with_fixed_delay<C, F, Fut, E>(
    config: &StreamRetryConfig,
    mut is_current: C,
    mut op: F,
) -> RetryOutcome
where
    C: FnMut() -> bool,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let max_attempts = config.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        if !is_current() {
            return RetryOutcome::Superseded;
        }
        match op(attempt).await {
            Ok(()) => return RetryOutcome::Completed { attempt },
            Err(err) => {
                tracing::debug!(attempt, max_attempts, error = %err, "stream attempt failed");
                if attempt < max_attempts {
                    tokio::time::sleep(config.delay()).await;
                }
            }
        }
    }

    RetryOutcome::Exhausted {
        attempts: max_attempts,
    }
}
