use crate::types::{MessageId, PinnedEntry, PinnedWindow};

impl PinnedWindow {
    /// A window that has not produced data yet.
    pub fn loading() -> Self {
        Self {
            entries: Vec::new(),
            total_count: 0,
            is_loading: true,
            has_hole_earlier: false,
            has_hole_later: false,
            earlier_bound_id: None,
            later_bound_id: None,
        }
    }

    /// A fully loaded window with no holes on either side.
    pub fn complete(entries: Vec<PinnedEntry>, total_count: usize) -> Self {
        Self {
            entries,
            total_count,
            is_loading: false,
            has_hole_earlier: false,
            has_hole_later: false,
            earlier_bound_id: None,
            later_bound_id: None,
        }
    }

    /// First loaded entry (earliest pin in the window).
    pub fn first_entry(&self) -> Option<&PinnedEntry> {
        self.entries.first()
    }

    /// Last loaded entry (latest pin in the window).
    pub fn last_entry(&self) -> Option<&PinnedEntry> {
        self.entries.last()
    }

    /// Whether a hole sits close enough to `anchor` that this snapshot must
    /// be discarded and the query reissued.
    ///
    /// A window with fewer entries than the page size is complete regardless
    /// of hole flags: there is nothing more to fetch. Otherwise the anchor
    /// must fall outside a two-entry margin at the holed edge; the margin
    /// keeps a boundary-sitting anchor from oscillating between restarts.
    pub fn hole_adjacent_to(&self, anchor: MessageId, page_size: usize) -> bool {
        if self.is_loading || self.entries.len() < page_size {
            return false;
        }

        if self.has_hole_earlier {
            if let Some(second) = self.entries.get(1) {
                if anchor < second.message.id {
                    return true;
                }
            }
        }

        if self.has_hole_later {
            let second_to_last = self
                .entries
                .len()
                .checked_sub(2)
                .and_then(|index| self.entries.get(index));
            if let Some(second_to_last) = second_to_last {
                if anchor > second_to_last.message.id {
                    return true;
                }
            }
        }

        false
    }
}
