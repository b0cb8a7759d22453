//! Shared exponential-backoff retry helper.
//!
//! Used by the OCR provider, the LLM client, and the orchestrator's
//! per-task retry policy — all three specify the same schedule (initial
//! 2s, multiplier 2.0, cap 30s, 3 attempts), so the decision of whether to
//! retry is centralised in [`is_retryable`](crate::errors::is_retryable)
//! and the backoff math lives here once, grounded on the teacher's
//! `with_retry` helper in `foiacquire::repository::mod`.

use std::time::Duration;

use crate::errors::{is_retryable, AppError};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub multiplier: f64,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(2),
            multiplier: 2.0,
            cap: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given attempt (1-indexed: attempt 1 has no delay).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.powi((attempt - 2) as i32);
        let millis = (self.initial.as_millis() as f64) * factor;
        let millis = millis.min(self.cap.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    /// Run `op` up to `max_attempts` times, sleeping between attempts per
    /// the backoff schedule, retrying only on [`is_retryable`] errors.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, AppError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if is_retryable(e.kind, attempt) && attempt < self.max_attempts => {
                    let delay = self.delay_for_attempt(attempt + 1);
                    tracing::debug!(
                        attempt,
                        ?delay,
                        kind = %e.kind,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
