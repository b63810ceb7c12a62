//! Cancellation and timeout wrappers for pipeline I/O
//!
//! Registry queries and downloads are raced against the caller's
//! [`CancellationToken`]. Partially written directories are left in place.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::LoaderError;

/// Await `operation` unless `token` is cancelled first
pub async fn cancellable<F, T>(token: &CancellationToken, operation: F) -> Result<T, LoaderError>
where
    F: Future<Output = Result<T, LoaderError>>,
{
    if token.is_cancelled() {
        return Err(LoaderError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(LoaderError::Cancelled),
        result = operation => result,
    }
}

/// Execute operation with custom timeout
pub async fn with_custom_timeout<F, T>(
    operation: F,
    duration: Duration,
) -> Result<T, tokio::time::error::Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, operation).await
}
