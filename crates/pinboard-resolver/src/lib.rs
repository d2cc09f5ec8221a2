//! Async runtime around the `pinboard-core` domain logic.
//!
//! This crate hosts the resolver driver task, the scroll tracker/feed pair
//! that carries reading-position input into it, the windowed-query source
//! trait, and an in-memory pin board for tests and demos.

/// In-memory pin board implementing [`source::HistoryWindowSource`].
pub mod memory;
/// Resolver driver task and its owner handle.
pub mod resolver;
/// Windowed pinned-set queries and their cancellable subscriptions.
pub mod source;
/// Scroll/jump input channel between the message list and resolvers.
pub mod tracker;

pub use memory::MemoryPinBoard;
pub use resolver::{HandleStream, PinnedMessageResolver, ResolverHandle};
pub use source::{HistoryWindowSource, WindowSubscription};
pub use tracker::{ScrollAnchorTracker, ScrollFeed, scroll_channel};
