// ── Reactive snapshot streams ──
//
// Subscription handle for consuming state changes at the rendering
// boundary: entity tables, the dashboard, and the listener set.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// A subscription to a read-only snapshot.
///
/// Provides both point-in-time snapshot access and reactive change
/// notification via the `changed()` method or by converting to a `Stream`.
pub struct SnapshotStream<T: Send + Sync + 'static> {
    current: Arc<T>,
    receiver: watch::Receiver<Arc<T>>,
}

impl<T: Send + Sync + 'static> SnapshotStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Arc<T>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Get the snapshot captured at creation time (or at the last `changed()`).
    pub fn current(&self) -> &Arc<T> {
        &self.current
    }

    /// Get the latest snapshot (may have changed since creation).
    pub fn latest(&self) -> Arc<T> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the owning engine has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<T>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> SnapshotWatchStream<T> {
        SnapshotWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
///
/// Yields the current snapshot first, then a new one each time the
/// underlying state is mutated.
pub struct SnapshotWatchStream<T: Send + Sync + 'static> {
    inner: WatchStream<Arc<T>>,
}

impl<T: Send + Sync + 'static> Stream for SnapshotWatchStream<T> {
    type Item = Arc<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // WatchStream<Arc<T>> is Unpin.
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready};

    #[tokio::test]
    async fn changed_tracks_latest_snapshot() {
        let (tx, rx) = watch::channel(Arc::new(1u32));
        let mut stream = SnapshotStream::new(rx);
        assert_eq!(**stream.current(), 1);

        tx.send_replace(Arc::new(2));
        assert_eq!(*stream.latest(), 2);
        assert_eq!(*stream.changed().await.unwrap(), 2);
        assert_eq!(**stream.current(), 2);

        drop(tx);
        assert!(stream.changed().await.is_none());
    }

    #[test]
    fn stream_yields_current_then_each_change() {
        let (tx, rx) = watch::channel(Arc::new(1u32));
        let mut stream = tokio_test::task::spawn(SnapshotStream::new(rx).into_stream());
        assert_eq!(*assert_ready!(stream.poll_next()).unwrap(), 1);
        assert_pending!(stream.poll_next());

        tx.send_replace(Arc::new(5));
        assert!(stream.is_woken());
        assert_eq!(*assert_ready!(stream.poll_next()).unwrap(), 5);
    }
}
