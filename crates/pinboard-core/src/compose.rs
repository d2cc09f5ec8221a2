use crate::anchor::ReferenceAnchor;
use crate::types::{ChatLocation, PinnedEntry, PinnedMessageHandle, PinnedWindow};

/// Compose the anchored-mode handle from the current window and anchor.
///
/// `top` is the most-recently-pinned entry from the separate 1-entry lookup;
/// the anchored window may not include it. Returns `None` for an empty
/// window, a still-loading anchor, or a thread fallback the user has not
/// reached yet.
pub fn compose_anchored(
    location: &ChatLocation,
    window: &PinnedWindow,
    anchor: &ReferenceAnchor,
    top: &PinnedEntry,
) -> Option<PinnedMessageHandle> {
    let (anchor_id, min_id, is_scrolled) = match anchor {
        ReferenceAnchor::Ready {
            id,
            min_id,
            is_scrolled,
        } => (*id, *min_id, *is_scrolled),
        ReferenceAnchor::Loading => return None,
    };

    let first = window.first_entry()?;

    // An explicit jump to the first pinned item means "show me the latest,
    // I'm starting from the top".
    if is_scrolled && first.message.id == anchor_id {
        return Some(handle_for(top, window.total_count, top));
    }

    // The most recent pinned message the user has already scrolled past.
    let passed = window.entries.iter().rev().find(|entry| {
        if is_scrolled {
            entry.message.id < anchor_id
        } else {
            entry.message.id <= anchor_id
        }
    });

    match passed {
        Some(entry) => Some(handle_for(entry, window.total_count, top)),
        None => {
            // User is above all currently-loaded pins: fall back to the
            // first one, except in threads where a pin past the visible
            // lower bound would surface a message not reached yet.
            if location.is_thread() && first.message.id > min_id {
                return None;
            }
            Some(handle_for(first, window.total_count, top))
        }
    }
}

/// Compose the latest-mode handle: the newest pin in the window.
pub fn compose_latest(window: &PinnedWindow) -> Option<PinnedMessageHandle> {
    let last = window.last_entry()?;
    Some(PinnedMessageHandle {
        message: last.message.clone(),
        index_in_set: last.position,
        total_count: window.total_count,
        top_message_id: last.message.id,
    })
}

fn handle_for(entry: &PinnedEntry, total_count: usize, top: &PinnedEntry) -> PinnedMessageHandle {
    PinnedMessageHandle {
        message: entry.message.clone(),
        index_in_set: entry.position,
        total_count,
        top_message_id: top.message.id,
    }
}
