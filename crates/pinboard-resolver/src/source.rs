use pinboard_core::{ChatLocation, MessageId, PinnedWindow};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Paginated access to a chat location's pinned set.
///
/// `anchor = None` means "most recent". The returned subscription is a
/// long-lived stream: the same query re-emits whenever its underlying data
/// changes (new pin, unpin, hole filled), and terminates only on
/// cancellation. Implementations may do their I/O anywhere but must deliver
/// snapshots through the subscription channel.
pub trait HistoryWindowSource: Send + Sync {
    /// Open a windowed query of up to `count` pinned entries around `anchor`.
    fn query(
        &self,
        location: &ChatLocation,
        anchor: Option<MessageId>,
        count: usize,
    ) -> WindowSubscription;
}

/// One live windowed query: a snapshot stream paired with the token that
/// stops upstream work.
///
/// Delivery is latest-wins: snapshots supersede each other, so a consumer
/// that falls behind observes only the newest one, never a stale backlog.
/// Dropping the subscription cancels it; there is no fire-and-forget path.
#[derive(Debug)]
pub struct WindowSubscription {
    rx: watch::Receiver<Option<PinnedWindow>>,
    cancel: CancellationToken,
}

impl WindowSubscription {
    /// Pair a snapshot receiver with its upstream cancellation token.
    pub fn new(rx: watch::Receiver<Option<PinnedWindow>>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Build a subscription together with its sender side. Sources publish
    /// snapshots with `send_replace(Some(window))`.
    pub fn channel() -> (watch::Sender<Option<PinnedWindow>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self::new(rx, CancellationToken::new()))
    }

    /// Newest unseen snapshot; `None` once the source closed the stream.
    pub async fn next(&mut self) -> Option<PinnedWindow> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(window) = self.rx.borrow_and_update().clone() {
                return Some(window);
            }
        }
    }

    /// Token the source watches to stop work for this query.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop upstream work for this query.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WindowSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
