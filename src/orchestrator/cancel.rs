// ABOUTME: Cancellation-aware await helpers for workflow steps.
// ABOUTME: Every suspension point in a unit goes through one of these.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::error::OrchestrationError;

/// Run `fut` unless `token` fires first.
pub(crate) async fn cancellable<F: Future>(
    token: &CancellationToken,
    fut: F,
) -> Result<F::Output, OrchestrationError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(OrchestrationError::Cancelled),
        out = fut => Ok(out),
    }
}

pub(crate) async fn sleep(
    token: &CancellationToken,
    duration: Duration,
) -> Result<(), OrchestrationError> {
    cancellable(token, tokio::time::sleep(duration)).await
}

pub(crate) fn ensure_active(token: &CancellationToken) -> Result<(), OrchestrationError> {
    if token.is_cancelled() {
        Err(OrchestrationError::Cancelled)
    } else {
        Ok(())
    }
}
