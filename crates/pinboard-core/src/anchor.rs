use serde::{Deserialize, Serialize};

use crate::types::{JumpRequest, MessageId, VisibleRange};

/// Normalized "where is the user" value fed to the resolver.
///
/// Invariant: `min_id <= id` when both derive from the same visible range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReferenceAnchor {
    /// The main list's visible range is not yet known.
    Loading,
    /// A usable anchor.
    Ready {
        /// Message the resolver should anchor to.
        id: MessageId,
        /// Lower bound of what the user can currently see.
        min_id: MessageId,
        /// True when the anchor came from an explicit jump rather than
        /// natural scrolling; changes comparison semantics in composition.
        is_scrolled: bool,
    },
}

impl ReferenceAnchor {
    /// Whether this anchor carries a usable position.
    pub fn is_ready(&self) -> bool {
        matches!(self, ReferenceAnchor::Ready { .. })
    }

    /// Anchor id, when ready.
    pub fn id(&self) -> Option<MessageId> {
        match self {
            ReferenceAnchor::Ready { id, .. } => Some(*id),
            ReferenceAnchor::Loading => None,
        }
    }
}

/// Folds visible-range reports and explicit jump requests into a single
/// [`ReferenceAnchor`].
///
/// A jump anchor persists until a new jump replaces it, or until the visible
/// range's top bound moves strictly below the target while the request
/// granted upward replacement. Downward scrolling never evicts a jump.
#[derive(Debug, Clone, Default)]
pub struct AnchorComputer {
    jump: Option<JumpRequest>,
}

impl AnchorComputer {
    /// New computer with no jump target.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an explicit jump target, replacing any previous one.
    pub fn set_jump(&mut self, request: JumpRequest) {
        self.jump = Some(request);
    }

    /// Drop the explicit jump target.
    pub fn clear_jump(&mut self) {
        self.jump = None;
    }

    /// Compute the current anchor from the latest visible range.
    ///
    /// May evict the stored jump target (upward direction only).
    pub fn compute(&mut self, visible: Option<VisibleRange>) -> ReferenceAnchor {
        if let Some(jump) = self.jump {
            let evict = jump.allow_replace_upward
                && visible.is_some_and(|range| range.top < jump.target);
            if !evict {
                return ReferenceAnchor::Ready {
                    id: jump.target,
                    min_id: jump.target,
                    is_scrolled: true,
                };
            }
            self.jump = None;
        }

        match visible {
            Some(range) => ReferenceAnchor::Ready {
                id: range.top,
                min_id: range.bottom,
                is_scrolled: false,
            },
            None => ReferenceAnchor::Loading,
        }
    }
}
