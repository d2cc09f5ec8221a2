use std::fmt;

use serde::{Deserialize, Serialize};

/// Default windowed-query page size used by anchored resolvers.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Totally ordered message identity within one chat.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Chat identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChatId(pub u64);

/// Forum thread identity within a chat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ThreadId(pub u64);

/// Where a pinned set lives: a whole chat, or one forum thread within it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChatLocation {
    /// Target chat.
    pub chat: ChatId,
    /// Optional forum thread scope; thread pinned sets are independent.
    pub thread: Option<ThreadId>,
}

impl ChatLocation {
    /// Location covering the whole chat.
    pub fn chat(chat: ChatId) -> Self {
        Self { chat, thread: None }
    }

    /// Location scoped to one forum thread.
    pub fn thread(chat: ChatId, thread: ThreadId) -> Self {
        Self {
            chat,
            thread: Some(thread),
        }
    }

    /// Whether this location is a forum thread.
    pub fn is_thread(&self) -> bool {
        self.thread.is_some()
    }
}

/// Display payload of a pinned message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinnedMessage {
    /// Message identity.
    pub id: MessageId,
    /// Sender user id.
    pub author: String,
    /// Display-ready text body.
    pub body: String,
    /// When the message was pinned, milliseconds since Unix epoch.
    pub pinned_at_ms: u64,
}

/// One `(message, positionIndex)` pair inside a pinned window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinnedEntry {
    /// The pinned message.
    pub message: PinnedMessage,
    /// 0-based position within the full pinned set.
    pub position: usize,
}

/// Snapshot of one windowed query over the pinned set.
///
/// Entry order is pin time, not message order. Invariant:
/// `total_count >= entries.len()` whenever `is_loading` is false and no hole
/// flags are set; violated only transiently during a requery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinnedWindow {
    /// Loaded entries, message identities unique within the window.
    pub entries: Vec<PinnedEntry>,
    /// Size of the full pinned set, independent of how much is loaded.
    pub total_count: usize,
    /// Whether the query is still loading.
    pub is_loading: bool,
    /// A gap exists before the first loaded entry.
    pub has_hole_earlier: bool,
    /// A gap exists after the last loaded entry.
    pub has_hole_later: bool,
    /// Adjacent earlier page boundary, when no hole is known on that side.
    pub earlier_bound_id: Option<MessageId>,
    /// Adjacent later page boundary, when no hole is known on that side.
    pub later_bound_id: Option<MessageId>,
}

/// Visible slice of the main message list.
///
/// `top` is the largest visible message id, `bottom` the smallest
/// (`bottom <= top`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisibleRange {
    /// Largest visible message id.
    pub top: MessageId,
    /// Smallest visible message id.
    pub bottom: MessageId,
}

impl VisibleRange {
    /// Build a range, normalizing a swapped pair.
    pub fn new(top: MessageId, bottom: MessageId) -> Self {
        if bottom <= top {
            Self { top, bottom }
        } else {
            Self {
                top: bottom,
                bottom: top,
            }
        }
    }
}

/// Explicit "jump to message" request from the controller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct JumpRequest {
    /// Message the user jumped to.
    pub target: MessageId,
    /// Whether scrolling up past the target may evict this anchor in favor
    /// of the natural visible-range anchor. Downward scrolling never evicts.
    pub allow_replace_upward: bool,
}

/// Which pinned message a resolver tracks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResolutionMode {
    /// Always the newest pinned message (badge-style consumers).
    Latest,
    /// The message relevant to the user's reading position (banner-style).
    Anchored,
}

/// Resolver output: which pinned message to show, and where it sits.
///
/// Produced fresh on every resolution; compared by value so consecutive
/// equal resolutions are suppressed downstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinnedMessageHandle {
    /// The resolved message.
    pub message: PinnedMessage,
    /// 0-based position within the full pinned set ("2 of 5" style UI).
    pub index_in_set: usize,
    /// Size of the full pinned set.
    pub total_count: usize,
    /// Identity of the most-recently-pinned message in the set, even when a
    /// different, anchor-relevant message is displayed.
    pub top_message_id: MessageId,
}

/// Resolver tuning supplied at construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Windowed-query page size.
    pub page_size: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}
