// Cancellation plumbing shared by every layer that performs I/O

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::{RagError, Result};

/// Cloneable cancellation signal; every clone observes the same flag.
///
/// Once cancelled a token stays cancelled.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    signal: Arc<watch::Sender<bool>>,
}

impl Default for CancellationToken {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    #[inline]
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal: Arc::new(signal),
        }
    }

    #[inline]
    pub fn cancel(&self) {
        self.signal.send_replace(true);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        *self.signal.borrow()
    }

    /// Resolves once the token has been cancelled
    #[inline]
    pub async fn cancelled(&self) {
        let mut fired = self.signal.subscribe();
        // The sender lives as long as `self`, so waiting cannot fail
        let _ = fired.wait_for(|cancelled| *cancelled).await;
    }
}

/// Fail fast when the token has already fired.
#[inline]
pub fn ensure_active(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        return Err(RagError::Cancelled);
    }
    Ok(())
}

/// Drive `operation` to completion unless `token` fires first.
///
/// Cancellation wins ties, so an already-cancelled token never starts the work.
#[inline]
pub async fn cancellable<T, F>(token: &CancellationToken, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = token.cancelled() => Err(RagError::Cancelled),
        result = operation => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();

        let result = cancellable(&token, async { Ok(42) }).await;
        assert!(matches!(result, Err(RagError::Cancelled)));
        assert!(ensure_active(&token).is_err());
    }

    #[tokio::test]
    async fn active_token_lets_work_finish() {
        let token = CancellationToken::new();
        let result = cancellable(&token, async { Ok("done") }).await;
        assert_eq!(result.expect("operation should complete"), "done");
        assert!(ensure_active(&token).is_ok());
    }

    #[test]
    fn clones_share_the_flag() {
        let token = CancellationToken::default();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn cancellation_interrupts_pending_work() {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            child.cancel();
        });

        let result: Result<()> = cancellable(&token, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(RagError::Cancelled)));
    }
}
