//! Request-context cancellation for repository calls.

use std::future::Future;

use sigil_storage::{StorageError, StorageResult};
use tokio_util::sync::CancellationToken;

/// Races a read or delete against `cancel`.
///
/// Cancellation wins ties, so an already-cancelled context never starts the
/// call. Not for writes: a started write must run to completion.
pub(crate) async fn cancellable<T, F>(
    cancel: &CancellationToken,
    operation: &'static str,
    call: F,
) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StorageError::cancelled(operation)),
        result = call => result,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };

    use super::*;

    #[tokio::test]
    async fn test_completes_when_not_cancelled() {
        let cancel = CancellationToken::new();
        let result = cancellable(&cancel, "list", async { Ok::<_, StorageError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_precancelled_never_polls_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let polled = AtomicBool::new(false);

        let result = cancellable(&cancel, "list", async {
            polled.store(true, Ordering::SeqCst);
            Ok::<(), StorageError>(())
        })
        .await;

        assert!(matches!(result, Err(StorageError::Cancelled { operation: "list" })));
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_slow_call() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result = cancellable(&cancel, "delete", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<(), StorageError>(())
        })
        .await;

        assert!(matches!(result, Err(StorageError::Cancelled { operation: "delete" })));
    }
}
