//! Domain logic for resolving "which pinned message should the chat header
//! currently display?".
//!
//! This crate defines the protocol types, reference-anchor computation,
//! window/hole helpers, handle composition, and the resolver state machine.
//! The async driver that wires these to live sources lives in
//! `pinboard-resolver`.

/// Reference-anchor value and its computation from scroll/jump inputs.
pub mod anchor;
/// Pure handle composition for both resolution modes.
pub mod compose;
/// Resolver infrastructure errors.
pub mod error;
/// Resolver finite-state machine: `(state, event) -> effects`.
pub mod state_machine;
/// Protocol types (ids, windows, handles, config).
pub mod types;
/// Pinned-window completeness and hole-adjacency helpers.
pub mod window;

pub use anchor::{AnchorComputer, ReferenceAnchor};
pub use compose::{compose_anchored, compose_latest};
pub use error::ResolverError;
pub use state_machine::{QueryToken, ResolverEffect, ResolverEvent, ResolverStateMachine};
pub use types::{
    ChatId, ChatLocation, DEFAULT_PAGE_SIZE, JumpRequest, MessageId, PinnedEntry, PinnedMessage,
    PinnedMessageHandle, PinnedWindow, ResolutionMode, ResolverConfig, ThreadId, VisibleRange,
};
