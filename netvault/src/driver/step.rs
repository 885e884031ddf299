//! Timeout and cancellation bounds for session steps.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{DriverError, Result};

/// Bounds every blocking session step by a timeout and the run's cancel token.
///
/// A step already in flight when cancellation is signalled gets `grace`
/// more time to finish; after that it is dropped and reported as
/// [`DriverError::Cancelled`].
#[derive(Debug, Clone, Copy)]
pub struct StepGuard<'a> {
    timeout: Duration,
    grace: Duration,
    cancel: &'a CancellationToken,
}

impl<'a> StepGuard<'a> {
    pub fn new(timeout: Duration, grace: Duration, cancel: &'a CancellationToken) -> Self {
        Self {
            timeout,
            grace,
            cancel,
        }
    }

    /// The per-operation timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the run has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run a step bounded by the per-operation timeout.
    pub async fn run<T, F>(&self, step: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.run_for(self.timeout, step).await
    }

    /// Run a step bounded by `limit` instead of the per-operation timeout.
    pub async fn run_for<T, F>(&self, limit: Duration, step: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let deadline = Instant::now() + limit;
        let step = tokio::time::timeout_at(deadline, step);
        tokio::pin!(step);

        tokio::select! {
            biased;
            res = &mut step => {
                return res.unwrap_or(Err(DriverError::Timeout(limit).into()));
            }
            _ = self.cancel.cancelled() => {}
        }

        let grace_deadline = deadline.min(Instant::now() + self.grace);
        match tokio::time::timeout_at(grace_deadline, &mut step).await {
            Ok(res) => res.unwrap_or(Err(DriverError::Timeout(limit).into())),
            Err(_) => Err(DriverError::Cancelled.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[tokio::test(start_paused = true)]
    async fn test_step_times_out() {
        let cancel = CancellationToken::new();
        let guard = StepGuard::new(Duration::from_secs(5), Duration::from_secs(1), &cancel);

        let result: Result<()> = guard
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert!(matches!(
            result,
            Err(Error::Driver(DriverError::Timeout(d))) if d == Duration::from_secs(5)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_finishes_within_grace() {
        let cancel = CancellationToken::new();
        let guard = StepGuard::new(Duration::from_secs(30), Duration::from_secs(5), &cancel);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = guard
            .run(async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Ok(42)
            })
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_dropped_after_grace() {
        let cancel = CancellationToken::new();
        let guard = StepGuard::new(Duration::from_secs(30), Duration::from_secs(2), &cancel);
        cancel.cancel();

        let result: Result<()> = guard
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Driver(DriverError::Cancelled))));
    }
}
