//! Cancellation for fragment streams.

use tokio_util::sync::CancellationToken;

use super::types::FragmentSource;

/// A handle that can be used to request cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Create a new cancel handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Wrapped streams stop yielding as soon as they
    /// observe it; adapters may also watch [`CancelHandle::cancelled`] to stop
    /// remote generation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A future that resolves when cancellation is requested.
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

/// Wrap `stream` so a pending pull ends as soon as `handle` is cancelled.
pub(crate) fn guard_stream(stream: FragmentSource, handle: &CancelHandle) -> FragmentSource {
    let token = handle.token.clone();
    let mut inner = stream;
    let s = async_stream::stream! {
        use futures_util::StreamExt;
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                item = inner.next() => {
                    let Some(item) = item else { break };
                    yield item;
                }
            }
        }
    };
    Box::pin(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::Fragment;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn cancel_wakes_pending_next_immediately() {
        // A stream that never yields and never ends.
        let pending: FragmentSource = Box::pin(futures_util::stream::pending());
        let handle = CancelHandle::new();
        let mut s = guard_stream(pending, &handle);

        let waiter = tokio::spawn(async move { s.next().await });

        tokio::task::yield_now().await;
        handle.cancel();

        let out = tokio::time::timeout(std::time::Duration::from_millis(200), waiter)
            .await
            .expect("cancel should wake the waiting task")
            .expect("task ok");

        assert!(out.is_none());
    }

    #[tokio::test]
    async fn uncancelled_stream_passes_items_through() {
        let source: FragmentSource = Box::pin(futures_util::stream::iter(vec![
            Ok(Fragment::content("a")),
            Ok(Fragment::content("b")),
        ]));
        let handle = CancelHandle::new();
        let items: Vec<_> = guard_stream(source, &handle).collect().await;
        assert_eq!(items.len(), 2);
        assert!(!handle.is_cancelled());
    }
}
