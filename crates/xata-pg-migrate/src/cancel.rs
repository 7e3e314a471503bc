//! Cancellation helpers shared by the migration phases.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{MigrateError, Result};

/// Fail with [`MigrateError::Cancelled`] if the token has fired.
pub fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(MigrateError::Cancelled)
    } else {
        Ok(())
    }
}

/// Await `fut` unless the token fires first.
///
/// A token that is already cancelled wins without polling `fut`. When the
/// token fires mid-flight, `fut` is dropped, which abandons the statement it
/// was waiting on.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MigrateError::Cancelled),
        result = fut => result,
    }
}
