use pinboard_core::{JumpRequest, VisibleRange};
use tokio::sync::watch;

/// Reporting side of the scroll feed, held by the main message list.
///
/// Publishes the currently visible range and explicit jump targets. Values
/// are latest-wins; the resolver never needs intermediate positions.
#[derive(Debug, Clone)]
pub struct ScrollAnchorTracker {
    visible_tx: watch::Sender<Option<VisibleRange>>,
    jump_tx: watch::Sender<Option<JumpRequest>>,
}

impl ScrollAnchorTracker {
    /// Report the visible range, or `None` while layout is not settled.
    pub fn set_visible_range(&self, range: Option<VisibleRange>) {
        self.visible_tx.send_replace(range);
    }

    /// Install an explicit jump target, replacing any previous one.
    /// Re-requesting an identical target is a no-op: it produces a
    /// value-equal anchor, which the resolver deduplicates.
    pub fn request_jump(&self, request: JumpRequest) {
        self.jump_tx.send_replace(Some(request));
    }

    /// Drop the explicit jump target.
    pub fn clear_jump(&self) {
        self.jump_tx.send_replace(None);
    }
}

/// Consuming side of the scroll feed, owned by a resolver.
#[derive(Debug)]
pub struct ScrollFeed {
    pub(crate) visible_rx: watch::Receiver<Option<VisibleRange>>,
    pub(crate) jump_rx: watch::Receiver<Option<JumpRequest>>,
}

/// Create a connected tracker/feed pair.
pub fn scroll_channel() -> (ScrollAnchorTracker, ScrollFeed) {
    let (visible_tx, visible_rx) = watch::channel(None);
    let (jump_tx, jump_rx) = watch::channel(None);
    (
        ScrollAnchorTracker {
            visible_tx,
            jump_tx,
        },
        ScrollFeed {
            visible_rx,
            jump_rx,
        },
    )
}
