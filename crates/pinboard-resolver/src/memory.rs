use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use pinboard_core::{ChatLocation, MessageId, PinnedEntry, PinnedMessage, PinnedWindow};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::source::{HistoryWindowSource, WindowSubscription};

#[derive(Debug)]
struct LiveQuery {
    location: ChatLocation,
    anchor: Option<MessageId>,
    count: usize,
    tx: watch::Sender<Option<PinnedWindow>>,
    cancel: CancellationToken,
}

/// In-memory [`HistoryWindowSource`] backed by per-location pin sets.
///
/// Every mutation re-emits a fresh snapshot to all live subscriptions for
/// that location, so the same query observes pins and unpins over time.
/// Holes never occur here; everything is local.
#[derive(Debug, Default, Clone)]
pub struct MemoryPinBoard {
    inner: Arc<Mutex<BoardInner>>,
}

#[derive(Debug, Default)]
struct BoardInner {
    // Pin-time order per location.
    sets: HashMap<ChatLocation, Vec<PinnedMessage>>,
    live: Vec<LiveQuery>,
}

impl MemoryPinBoard {
    pub fn new() -> Self {
        Self::default()
    }

    // No mutation can leave the board half-updated, so a poisoned lock is
    // still usable.
    fn locked(&self) -> MutexGuard<'_, BoardInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pin a message, appending it to the location's pin-time order. A
    /// message already pinned is moved to the newest slot.
    pub fn pin(&self, location: ChatLocation, message: PinnedMessage) {
        let mut inner = self.locked();
        let set = inner.sets.entry(location).or_default();
        set.retain(|existing| existing.id != message.id);
        debug!(id = %message.id, "pinning message");
        set.push(message);
        Self::notify(&mut inner, &location);
    }

    /// Unpin a message; unknown ids are ignored.
    pub fn unpin(&self, location: ChatLocation, id: MessageId) {
        let mut inner = self.locked();
        if let Some(set) = inner.sets.get_mut(&location) {
            let before = set.len();
            set.retain(|existing| existing.id != id);
            if set.len() != before {
                debug!(%id, "unpinned message");
                Self::notify(&mut inner, &location);
            }
        }
    }

    /// Number of pinned messages at a location.
    pub fn pinned_count(&self, location: &ChatLocation) -> usize {
        let inner = self.locked();
        inner.sets.get(location).map_or(0, Vec::len)
    }

    fn notify(inner: &mut BoardInner, location: &ChatLocation) {
        inner
            .live
            .retain(|query| !query.cancel.is_cancelled() && !query.tx.is_closed());

        let set = inner.sets.get(location).cloned().unwrap_or_default();
        for query in inner
            .live
            .iter()
            .filter(|query| query.location == *location)
        {
            let window = build_window(&set, query.anchor, query.count);
            trace!(
                entries = window.entries.len(),
                total = window.total_count,
                "re-emitting window snapshot"
            );
            // Latest-wins: a lagging consumer wakes to the newest snapshot.
            query.tx.send_replace(Some(window));
        }
    }
}

impl HistoryWindowSource for MemoryPinBoard {
    fn query(
        &self,
        location: &ChatLocation,
        anchor: Option<MessageId>,
        count: usize,
    ) -> WindowSubscription {
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        let mut inner = self.locked();
        let set = inner.sets.get(location).cloned().unwrap_or_default();
        let window = build_window(&set, anchor, count);
        debug!(
            anchor = ?anchor,
            count,
            entries = window.entries.len(),
            "opening window query"
        );
        tx.send_replace(Some(window));

        inner.live.push(LiveQuery {
            location: *location,
            anchor,
            count,
            tx,
            cancel: cancel.clone(),
        });

        WindowSubscription::new(rx, cancel)
    }
}

fn build_window(set: &[PinnedMessage], anchor: Option<MessageId>, count: usize) -> PinnedWindow {
    let count = count.max(1);
    let len = set.len();

    let start = match anchor {
        // Most recent: the tail of the pin-time order.
        None => len.saturating_sub(count),
        Some(anchor) => {
            let nearest = set
                .iter()
                .rposition(|message| message.id <= anchor)
                .unwrap_or(0);
            let start = nearest.saturating_sub(count / 2);
            start.min(len.saturating_sub(count))
        }
    };
    let end = (start + count).min(len);

    let entries = set[start..end]
        .iter()
        .enumerate()
        .map(|(offset, message)| PinnedEntry {
            message: message.clone(),
            position: start + offset,
        })
        .collect();

    PinnedWindow {
        entries,
        total_count: len,
        is_loading: false,
        has_hole_earlier: false,
        has_hole_later: false,
        earlier_bound_id: start.checked_sub(1).map(|index| set[index].id),
        later_bound_id: set.get(end).map(|message| message.id),
    }
}
