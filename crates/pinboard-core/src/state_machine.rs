use crate::anchor::ReferenceAnchor;
use crate::compose::{compose_anchored, compose_latest};
use crate::types::{
    ChatLocation, MessageId, PinnedEntry, PinnedMessageHandle, PinnedWindow, ResolutionMode,
    ResolverConfig,
};

/// Identity of one issued windowed query.
///
/// Results are tagged with the token they were issued under; a result whose
/// token no longer matches the current one is discarded, which makes
/// cancellation a checkable invariant instead of a stream-combinator
/// property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryToken(u64);

/// Input consumed by the resolver state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverEvent {
    /// The reference anchor changed.
    AnchorChanged(ReferenceAnchor),
    /// A snapshot arrived for the anchored window query.
    WindowSnapshot {
        token: QueryToken,
        window: PinnedWindow,
    },
    /// A snapshot arrived for the persistent most-recent-pin lookup.
    TopSnapshot {
        token: QueryToken,
        window: PinnedWindow,
    },
}

/// Side effect requested by a transition, executed by the driver loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverEffect {
    /// Issue a windowed query; results come back as `WindowSnapshot`.
    IssueQuery {
        token: QueryToken,
        anchor: Option<MessageId>,
        count: usize,
    },
    /// Issue the 1-entry most-recent-pin lookup; results come back as
    /// `TopSnapshot`.
    IssueTopQuery { token: QueryToken },
    /// Cancel the query issued under `token`, stopping upstream work.
    CancelQuery { token: QueryToken },
    /// Publish a new resolved value. Only emitted on change.
    Emit(Option<PinnedMessageHandle>),
}

/// Pure finite-state machine behind one resolver instance.
///
/// Owns `{anchor, in-flight query token, last window, latest top entry}`;
/// `apply` is a pure `(state, event) -> effects` transition. No partial
/// result is ever emitted: a superseded query's snapshots are dropped by the
/// token check, and a holed snapshot is traded for a restart.
#[derive(Debug, Clone)]
pub struct ResolverStateMachine {
    location: ChatLocation,
    mode: ResolutionMode,
    config: ResolverConfig,
    next_token: u64,
    anchor: Option<ReferenceAnchor>,
    window_token: Option<QueryToken>,
    top_token: Option<QueryToken>,
    last_window: Option<PinnedWindow>,
    top_entry: Option<PinnedEntry>,
    top_received: bool,
    last_emitted: Option<Option<PinnedMessageHandle>>,
}

impl ResolverStateMachine {
    /// New machine for one location and mode.
    pub fn new(location: ChatLocation, mode: ResolutionMode, config: ResolverConfig) -> Self {
        Self {
            location,
            mode,
            config,
            next_token: 0,
            anchor: None,
            window_token: None,
            top_token: None,
            last_window: None,
            top_entry: None,
            top_received: false,
            last_emitted: None,
        }
    }

    /// Location this machine resolves for.
    pub fn location(&self) -> &ChatLocation {
        &self.location
    }

    /// Resolution mode.
    pub fn mode(&self) -> ResolutionMode {
        self.mode
    }

    /// Effects that bring the machine from cold to running.
    pub fn start(&mut self) -> Vec<ResolverEffect> {
        match self.mode {
            ResolutionMode::Latest => {
                let token = self.allocate_token();
                self.window_token = Some(token);
                vec![ResolverEffect::IssueQuery {
                    token,
                    anchor: None,
                    count: self.config.page_size,
                }]
            }
            ResolutionMode::Anchored => {
                // The anchored query waits for a ready anchor; the top-pin
                // lookup runs for the life of the resolver.
                let token = self.allocate_token();
                self.top_token = Some(token);
                vec![ResolverEffect::IssueTopQuery { token }]
            }
        }
    }

    /// Apply one event, returning the effects to execute.
    pub fn apply(&mut self, event: ResolverEvent) -> Vec<ResolverEffect> {
        match event {
            ResolverEvent::AnchorChanged(anchor) => self.on_anchor_changed(anchor),
            ResolverEvent::WindowSnapshot { token, window } => {
                self.on_window_snapshot(token, window)
            }
            ResolverEvent::TopSnapshot { token, window } => self.on_top_snapshot(token, window),
        }
    }

    fn on_anchor_changed(&mut self, anchor: ReferenceAnchor) -> Vec<ResolverEffect> {
        if matches!(self.mode, ResolutionMode::Latest) {
            return Vec::new();
        }
        if self.anchor.as_ref() == Some(&anchor) {
            return Vec::new();
        }

        self.anchor = Some(anchor);
        self.last_window = None;

        let mut effects = Vec::new();
        if let Some(stale) = self.window_token.take() {
            effects.push(ResolverEffect::CancelQuery { token: stale });
        }
        if let ReferenceAnchor::Ready { id, .. } = anchor {
            let token = self.allocate_token();
            self.window_token = Some(token);
            effects.push(ResolverEffect::IssueQuery {
                token,
                anchor: Some(id),
                count: self.config.page_size,
            });
        }
        effects
    }

    fn on_window_snapshot(&mut self, token: QueryToken, window: PinnedWindow) -> Vec<ResolverEffect> {
        if self.window_token != Some(token) || window.is_loading {
            return Vec::new();
        }

        match self.mode {
            ResolutionMode::Latest => {
                self.last_window = Some(window);
                self.emit_if_changed()
            }
            ResolutionMode::Anchored => {
                let anchor_id = self.anchor.as_ref().and_then(ReferenceAnchor::id);
                if let Some(anchor_id) = anchor_id {
                    if window.hole_adjacent_to(anchor_id, self.config.page_size) {
                        // Transient empty/holed result: restart instead of
                        // propagating it to the consumer. Upstream fills
                        // holes in bounded time.
                        let fresh = self.allocate_token();
                        self.window_token = Some(fresh);
                        return vec![
                            ResolverEffect::CancelQuery { token },
                            ResolverEffect::IssueQuery {
                                token: fresh,
                                anchor: Some(anchor_id),
                                count: self.config.page_size,
                            },
                        ];
                    }
                }
                self.last_window = Some(window);
                self.emit_if_changed()
            }
        }
    }

    fn on_top_snapshot(&mut self, token: QueryToken, window: PinnedWindow) -> Vec<ResolverEffect> {
        if self.top_token != Some(token) || window.is_loading {
            return Vec::new();
        }

        self.top_entry = window.last_entry().cloned();
        self.top_received = true;
        self.emit_if_changed()
    }

    fn emit_if_changed(&mut self) -> Vec<ResolverEffect> {
        let Some(candidate) = self.resolve_candidate() else {
            return Vec::new();
        };

        if self.last_emitted.as_ref() == Some(&candidate) {
            return Vec::new();
        }
        self.last_emitted = Some(candidate.clone());
        vec![ResolverEffect::Emit(candidate)]
    }

    /// Current resolution, or `None` when required inputs are still missing.
    /// The outer `Option` distinguishes "cannot resolve yet" from the inner
    /// "resolved to no pinned message".
    fn resolve_candidate(&self) -> Option<Option<PinnedMessageHandle>> {
        let window = self.last_window.as_ref()?;

        match self.mode {
            ResolutionMode::Latest => Some(compose_latest(window)),
            ResolutionMode::Anchored => {
                let anchor = self.anchor.as_ref()?;
                if !self.top_received {
                    return None;
                }
                if window.entries.is_empty() {
                    return Some(None);
                }
                // Non-empty window with no top entry is a transient
                // inconsistency between the two lookups; hold until the top
                // lookup catches up rather than flickering.
                let top = self.top_entry.as_ref()?;
                Some(compose_anchored(&self.location, window, anchor, top))
            }
        }
    }

    fn allocate_token(&mut self) -> QueryToken {
        let token = QueryToken(self.next_token);
        self.next_token += 1;
        token
    }
}
