use tokio::sync::watch;

/// Cooperative cancellation token observed at every suspension point.
///
/// Cloneable; all clones observe the same cancellation. A token created
/// with [`CancellationToken::noop`] can never fire, which lets call sites
/// that don't need cancellation skip the plumbing.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    rx: Option<watch::Receiver<bool>>,
}

impl CancellationToken {
    /// A token that never cancels.
    pub fn noop() -> Self {
        Self { rx: None }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Resolves once cancellation is requested. Never resolves for a noop
    /// token or after the handle is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        let Some(rx) = self.rx.as_mut() else {
            std::future::pending::<()>().await;
            return;
        };
        if *rx.borrow() {
            return;
        }
        loop {
            if rx.changed().await.is_err() {
                // Handle dropped without cancelling; stay pending.
                std::future::pending::<()>().await;
            }
            if *rx.borrow() {
                return;
            }
        }
    }
}

/// Owner side of a cancellation pair. Dropping the handle without calling
/// [`CancellationHandle::cancel`] leaves the tokens uncancelled forever.
#[derive(Debug)]
pub struct CancellationHandle {
    tx: watch::Sender<bool>,
}

impl CancellationHandle {
    /// Request cancellation on every outstanding token.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Create another token observing this handle.
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            rx: Some(self.tx.subscribe()),
        }
    }
}

/// Create a linked handle/token pair.
pub fn cancellation_pair() -> (CancellationHandle, CancellationToken) {
    let (tx, rx) = watch::channel(false);
    (CancellationHandle { tx }, CancellationToken { rx: Some(rx) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_fires_token() {
        let (handle, mut token) = cancellation_pair();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
        // Resolves immediately once cancelled.
        tokio::time::timeout(Duration::from_millis(50), token.cancelled())
            .await
            .ok();
    }

    #[tokio::test]
    async fn test_noop_token_never_fires() {
        let mut token = CancellationToken::noop();
        assert!(!token.is_cancelled());
        let timed_out = tokio::time::timeout(Duration::from_millis(20), token.cancelled())
            .await
            .is_err();
        assert!(timed_out);
    }

    #[tokio::test]
    async fn test_clones_observe_same_cancellation() {
        let (handle, token) = cancellation_pair();
        let second = token.clone();
        handle.cancel();
        assert!(second.is_cancelled());
        assert!(handle.token().is_cancelled());
    }
}
