use std::sync::Arc;

use pinboard_core::{
    AnchorComputer, ChatLocation, JumpRequest, PinnedMessageHandle, PinnedWindow, QueryToken,
    ResolutionMode, ResolverConfig, ResolverEffect, ResolverError, ResolverEvent,
    ResolverStateMachine, VisibleRange,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::source::{HistoryWindowSource, WindowSubscription};
use crate::tracker::ScrollFeed;

/// Stream of resolved values consumed by the chat header.
pub type HandleStream = watch::Receiver<Option<PinnedMessageHandle>>;

/// Resolves which pinned message a chat location should currently display.
///
/// One instance per mode per location; instances are fully independent. The
/// anchored mode follows the user's reading position, the latest mode always
/// tracks the newest pin.
pub struct PinnedMessageResolver;

impl PinnedMessageResolver {
    /// Spawn an anchored-mode resolver driven by `feed`.
    pub fn anchored(
        location: ChatLocation,
        config: ResolverConfig,
        source: Arc<dyn HistoryWindowSource>,
        feed: ScrollFeed,
    ) -> ResolverHandle {
        Self::spawn(location, ResolutionMode::Anchored, config, source, Some(feed))
    }

    /// Spawn a latest-mode resolver; scroll input is not consulted.
    pub fn latest(
        location: ChatLocation,
        config: ResolverConfig,
        source: Arc<dyn HistoryWindowSource>,
    ) -> ResolverHandle {
        Self::spawn(location, ResolutionMode::Latest, config, source, None)
    }

    fn spawn(
        location: ChatLocation,
        mode: ResolutionMode,
        config: ResolverConfig,
        source: Arc<dyn HistoryWindowSource>,
        feed: Option<ScrollFeed>,
    ) -> ResolverHandle {
        let (output_tx, output_rx) = watch::channel(None);
        let stop = CancellationToken::new();

        let driver = Driver {
            machine: ResolverStateMachine::new(location, mode, config),
            location,
            source,
            visible_rx: feed.as_ref().map(|feed| feed.visible_rx.clone()),
            jump_rx: feed.map(|feed| feed.jump_rx),
            computer: AnchorComputer::new(),
            active: None,
            top: None,
            output: output_tx,
            stop: stop.child_token(),
        };
        debug!(?location, ?mode, "spawning pinned-message resolver");
        let task = tokio::spawn(driver.run());

        ResolverHandle {
            output: output_rx,
            stop,
            task: Some(task),
        }
    }
}

/// Owner handle for one running resolver.
///
/// Dropping it cancels the driver task and, transitively, every in-flight
/// windowed query; `shutdown` does the same but awaits orderly teardown.
#[derive(Debug)]
pub struct ResolverHandle {
    output: HandleStream,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ResolverHandle {
    /// Subscribe to resolved values. Emitted on change only.
    pub fn subscribe(&self) -> HandleStream {
        self.output.clone()
    }

    /// Latest resolved value.
    pub fn current(&self) -> Option<PinnedMessageHandle> {
        self.output.borrow().clone()
    }

    /// Stop the resolver and wait for the driver task to finish.
    pub async fn shutdown(mut self) -> Result<(), ResolverError> {
        self.stop.cancel();
        match self.task.take() {
            Some(task) => task.await.map_err(|_| ResolverError::Detached),
            None => Ok(()),
        }
    }
}

impl Drop for ResolverHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

struct Driver {
    machine: ResolverStateMachine,
    location: ChatLocation,
    source: Arc<dyn HistoryWindowSource>,
    visible_rx: Option<watch::Receiver<Option<VisibleRange>>>,
    jump_rx: Option<watch::Receiver<Option<JumpRequest>>>,
    computer: AnchorComputer,
    active: Option<(QueryToken, WindowSubscription)>,
    top: Option<(QueryToken, WindowSubscription)>,
    output: watch::Sender<Option<PinnedMessageHandle>>,
    stop: CancellationToken,
}

impl Driver {
    async fn run(mut self) {
        let effects = self.machine.start();
        self.execute(effects);

        if self.visible_rx.is_some() {
            self.reinstall_jump();
            self.recompute_anchor();
        }

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => {
                    trace!(location = ?self.location, "resolver stopping");
                    break;
                }
                changed = watch_changed(&mut self.visible_rx) => {
                    if changed {
                        self.recompute_anchor();
                    } else {
                        warn!(
                            location = ?self.location,
                            error = %ResolverError::TrackerClosed,
                            "visible-range input ended"
                        );
                        self.visible_rx = None;
                    }
                }
                changed = watch_changed(&mut self.jump_rx) => {
                    if changed {
                        self.reinstall_jump();
                        self.recompute_anchor();
                    } else {
                        warn!(
                            location = ?self.location,
                            error = %ResolverError::TrackerClosed,
                            "jump input ended"
                        );
                        self.jump_rx = None;
                    }
                }
                snapshot = next_snapshot(&mut self.active) => {
                    match snapshot {
                        Some((token, window)) => {
                            let effects = self
                                .machine
                                .apply(ResolverEvent::WindowSnapshot { token, window });
                            self.execute(effects);
                        }
                        None => {
                            warn!(
                                location = ?self.location,
                                error = %ResolverError::SourceClosed,
                                "window query stream ended"
                            );
                            self.active = None;
                        }
                    }
                }
                snapshot = next_snapshot(&mut self.top) => {
                    match snapshot {
                        Some((token, window)) => {
                            let effects = self
                                .machine
                                .apply(ResolverEvent::TopSnapshot { token, window });
                            self.execute(effects);
                        }
                        None => {
                            warn!(
                                location = ?self.location,
                                error = %ResolverError::SourceClosed,
                                "top-pin query stream ended"
                            );
                            self.top = None;
                        }
                    }
                }
            }
        }
        // Subscriptions cancel on drop; no stale result can be delivered
        // past this point.
    }

    fn reinstall_jump(&mut self) {
        let jump = self
            .jump_rx
            .as_mut()
            .and_then(|rx| *rx.borrow_and_update());
        match jump {
            Some(request) => self.computer.set_jump(request),
            None => self.computer.clear_jump(),
        }
    }

    fn recompute_anchor(&mut self) {
        let visible = self
            .visible_rx
            .as_mut()
            .and_then(|rx| *rx.borrow_and_update());
        let anchor = self.computer.compute(visible);
        trace!(location = ?self.location, ?anchor, "anchor recomputed");
        let effects = self.machine.apply(ResolverEvent::AnchorChanged(anchor));
        self.execute(effects);
    }

    fn execute(&mut self, effects: Vec<ResolverEffect>) {
        for effect in effects {
            match effect {
                ResolverEffect::IssueQuery {
                    token,
                    anchor,
                    count,
                } => {
                    debug!(location = ?self.location, ?anchor, count, "issuing window query");
                    let subscription = self.source.query(&self.location, anchor, count);
                    self.active = Some((token, subscription));
                }
                ResolverEffect::IssueTopQuery { token } => {
                    debug!(location = ?self.location, "issuing top-pin lookup");
                    let subscription = self.source.query(&self.location, None, 1);
                    self.top = Some((token, subscription));
                }
                ResolverEffect::CancelQuery { token } => {
                    if let Some((active_token, subscription)) = self.active.take() {
                        if active_token == token {
                            trace!(location = ?self.location, "cancelling superseded query");
                            subscription.cancel();
                        } else {
                            self.active = Some((active_token, subscription));
                        }
                    }
                }
                ResolverEffect::Emit(value) => {
                    debug!(
                        location = ?self.location,
                        resolved = value.as_ref().map(|handle| handle.message.id.0),
                        "publishing resolution"
                    );
                    self.output.send_replace(value);
                }
            }
        }
    }
}

/// Next tagged snapshot from an optional subscription slot; pends forever on
/// an empty slot so it never wins the select.
async fn next_snapshot(
    slot: &mut Option<(QueryToken, WindowSubscription)>,
) -> Option<(QueryToken, PinnedWindow)> {
    match slot {
        Some((token, subscription)) => {
            let token = *token;
            subscription.next().await.map(|window| (token, window))
        }
        None => std::future::pending().await,
    }
}

/// Await a change on an optional watch slot; `false` means the sender side
/// is gone. Pends forever on an empty slot.
async fn watch_changed<T>(slot: &mut Option<watch::Receiver<T>>) -> bool {
    match slot {
        Some(rx) => rx.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use pinboard_core::{
        ChatId, JumpRequest, MessageId, PinnedEntry, PinnedMessage, VisibleRange,
    };
    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::memory::MemoryPinBoard;
    use crate::tracker::scroll_channel;

    const WAIT: Duration = Duration::from_secs(2);
    const QUIET: Duration = Duration::from_millis(100);

    struct IssuedQuery {
        anchor: Option<MessageId>,
        count: usize,
        tx: watch::Sender<Option<PinnedWindow>>,
        cancel: CancellationToken,
    }

    /// Source stub that records every issued query and lets the test script
    /// snapshot delivery, including out of request order.
    #[derive(Default)]
    struct StubSource {
        issued: Mutex<Vec<IssuedQuery>>,
    }

    impl StubSource {
        async fn wait_for_queries(&self, count: usize) {
            timeout(WAIT, async {
                loop {
                    if self.issued.lock().expect("stub lock").len() >= count {
                        return;
                    }
                    sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .unwrap_or_else(|_| panic!("expected {count} issued queries"));
        }

        fn respond(&self, index: usize, window: PinnedWindow) {
            self.issued.lock().expect("stub lock")[index]
                .tx
                .send_replace(Some(window));
        }

        fn query_info(&self, index: usize) -> (Option<MessageId>, usize) {
            let issued = self.issued.lock().expect("stub lock");
            (issued[index].anchor, issued[index].count)
        }

        fn is_cancelled(&self, index: usize) -> bool {
            self.issued.lock().expect("stub lock")[index]
                .cancel
                .is_cancelled()
        }
    }

    impl HistoryWindowSource for StubSource {
        fn query(
            &self,
            _location: &ChatLocation,
            anchor: Option<MessageId>,
            count: usize,
        ) -> WindowSubscription {
            let (tx, rx) = watch::channel(None);
            let cancel = CancellationToken::new();
            self.issued.lock().expect("stub lock").push(IssuedQuery {
                anchor,
                count,
                tx,
                cancel: cancel.clone(),
            });
            WindowSubscription::new(rx, cancel)
        }
    }

    fn entry(id: u64, position: usize) -> PinnedEntry {
        PinnedEntry {
            message: message(id),
            position,
        }
    }

    fn message(id: u64) -> PinnedMessage {
        PinnedMessage {
            id: MessageId(id),
            author: "@alice:example.org".to_owned(),
            body: format!("pin {id}"),
            pinned_at_ms: 1_700_000_000_000 + id,
        }
    }

    fn location() -> ChatLocation {
        ChatLocation::chat(ChatId(1))
    }

    async fn next_value(rx: &mut HandleStream) -> Option<PinnedMessageHandle> {
        timeout(WAIT, rx.changed())
            .await
            .expect("resolution timeout")
            .expect("resolver is alive");
        rx.borrow_and_update().clone()
    }

    async fn assert_quiet(rx: &mut HandleStream) {
        assert!(
            timeout(QUIET, rx.changed()).await.is_err(),
            "unexpected resolution emitted"
        );
    }

    #[tokio::test]
    async fn resolves_anchor_relative_pin_end_to_end() {
        let stub = Arc::new(StubSource::default());
        let (tracker, feed) = scroll_channel();
        let resolver = PinnedMessageResolver::anchored(
            location(),
            ResolverConfig::default(),
            stub.clone(),
            feed,
        );
        let mut rx = resolver.subscribe();

        tracker.set_visible_range(Some(VisibleRange::new(MessageId(2), MessageId(2))));
        // Query 0 is the persistent top-pin lookup, query 1 the anchored one.
        stub.wait_for_queries(2).await;
        assert_eq!(stub.query_info(0), (None, 1));
        assert_eq!(stub.query_info(1), (Some(MessageId(2)), 10));

        stub.respond(0, PinnedWindow::complete(vec![entry(3, 2)], 3));
        stub.respond(
            1,
            PinnedWindow::complete(vec![entry(1, 0), entry(2, 1), entry(3, 2)], 3),
        );

        let handle = next_value(&mut rx).await.expect("pin must resolve");
        assert_eq!(handle.message.id, MessageId(2));
        assert_eq!(handle.index_in_set, 1);
        assert_eq!(handle.total_count, 3);
        assert_eq!(handle.top_message_id, MessageId(3));

        resolver.shutdown().await.expect("clean shutdown");
    }

    #[tokio::test]
    async fn holed_snapshot_restarts_and_emits_only_the_final_handle() {
        let stub = Arc::new(StubSource::default());
        let (tracker, feed) = scroll_channel();
        let resolver = PinnedMessageResolver::anchored(
            location(),
            ResolverConfig::default(),
            stub.clone(),
            feed,
        );
        let mut rx = resolver.subscribe();

        tracker.set_visible_range(Some(VisibleRange::new(MessageId(12), MessageId(12))));
        stub.wait_for_queries(2).await;
        stub.respond(0, PinnedWindow::complete(vec![entry(110, 29)], 30));

        // Full page with a hole right where the anchor sits: must restart.
        let mut holed = PinnedWindow::complete(
            (0..10).map(|i| entry(20 + i * 10, i as usize)).collect(),
            30,
        );
        holed.has_hole_earlier = true;
        stub.respond(1, holed);

        stub.wait_for_queries(3).await;
        assert!(stub.is_cancelled(1), "holed query must be cancelled");
        assert_quiet(&mut rx).await;

        let complete = PinnedWindow::complete(
            (0..10).map(|i| entry(10 + i * 10, i as usize)).collect(),
            30,
        );
        stub.respond(2, complete);

        let handle = next_value(&mut rx).await.expect("pin must resolve");
        assert_eq!(handle.message.id, MessageId(10));
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn superseded_query_never_resolves_even_out_of_order() {
        let stub = Arc::new(StubSource::default());
        let (tracker, feed) = scroll_channel();
        let resolver = PinnedMessageResolver::anchored(
            location(),
            ResolverConfig::default(),
            stub.clone(),
            feed,
        );
        let mut rx = resolver.subscribe();

        tracker.set_visible_range(Some(VisibleRange::new(MessageId(2), MessageId(2))));
        stub.wait_for_queries(2).await;
        stub.respond(0, PinnedWindow::complete(vec![entry(3, 2)], 3));

        // Anchor moves before the first query answers.
        tracker.set_visible_range(Some(VisibleRange::new(MessageId(3), MessageId(3))));
        stub.wait_for_queries(3).await;
        assert!(stub.is_cancelled(1), "superseded query must be cancelled");

        // The new query answers first.
        stub.respond(
            2,
            PinnedWindow::complete(vec![entry(1, 0), entry(2, 1), entry(3, 2)], 3),
        );
        let handle = next_value(&mut rx).await.expect("pin must resolve");
        assert_eq!(handle.message.id, MessageId(3));

        // The stale query's result arrives afterwards and must change nothing.
        stub.respond(1, PinnedWindow::complete(vec![entry(1, 0)], 1));
        assert_quiet(&mut rx).await;
        assert_eq!(
            resolver.current().expect("value retained").message.id,
            MessageId(3)
        );
    }

    #[tokio::test]
    async fn identical_snapshot_redelivery_is_idempotent() {
        let stub = Arc::new(StubSource::default());
        let (tracker, feed) = scroll_channel();
        let resolver = PinnedMessageResolver::anchored(
            location(),
            ResolverConfig::default(),
            stub.clone(),
            feed,
        );
        let mut rx = resolver.subscribe();

        tracker.set_visible_range(Some(VisibleRange::new(MessageId(2), MessageId(2))));
        stub.wait_for_queries(2).await;
        stub.respond(0, PinnedWindow::complete(vec![entry(3, 2)], 3));

        let window = PinnedWindow::complete(vec![entry(1, 0), entry(2, 1), entry(3, 2)], 3);
        stub.respond(1, window.clone());
        let first = next_value(&mut rx).await.expect("pin must resolve");
        assert_eq!(first.message.id, MessageId(2));

        stub.respond(1, window);
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn empty_pinned_set_resolves_to_none() {
        let stub = Arc::new(StubSource::default());
        let (tracker, feed) = scroll_channel();
        let resolver = PinnedMessageResolver::anchored(
            location(),
            ResolverConfig::default(),
            stub.clone(),
            feed,
        );
        let mut rx = resolver.subscribe();

        tracker.set_visible_range(Some(VisibleRange::new(MessageId(2), MessageId(2))));
        stub.wait_for_queries(2).await;
        stub.respond(0, PinnedWindow::complete(Vec::new(), 0));
        stub.respond(1, PinnedWindow::complete(Vec::new(), 0));

        assert_eq!(next_value(&mut rx).await, None);
    }

    #[tokio::test]
    async fn latest_mode_follows_the_newest_pin() {
        let stub = Arc::new(StubSource::default());
        let resolver =
            PinnedMessageResolver::latest(location(), ResolverConfig::default(), stub.clone());
        let mut rx = resolver.subscribe();

        stub.wait_for_queries(1).await;
        assert_eq!(stub.query_info(0), (None, 10));

        stub.respond(0, PinnedWindow::complete(vec![entry(1, 0), entry(2, 1)], 2));
        let first = next_value(&mut rx).await.expect("pin must resolve");
        assert_eq!(first.message.id, MessageId(2));
        assert_eq!(first.total_count, 2);

        stub.respond(
            0,
            PinnedWindow::complete(vec![entry(1, 0), entry(2, 1), entry(3, 2)], 3),
        );
        let second = next_value(&mut rx).await.expect("pin must resolve");
        assert_eq!(second.message.id, MessageId(3));
        assert_eq!(second.total_count, 3);
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_queries() {
        let stub = Arc::new(StubSource::default());
        let (tracker, feed) = scroll_channel();
        let resolver = PinnedMessageResolver::anchored(
            location(),
            ResolverConfig::default(),
            stub.clone(),
            feed,
        );

        tracker.set_visible_range(Some(VisibleRange::new(MessageId(2), MessageId(2))));
        stub.wait_for_queries(2).await;

        resolver.shutdown().await.expect("clean shutdown");
        assert!(stub.is_cancelled(0));
        assert!(stub.is_cancelled(1));
    }

    #[tokio::test]
    async fn jump_anchor_forces_latest_when_targeting_the_first_pin() {
        let board = Arc::new(MemoryPinBoard::new());
        for id in [10u64, 20, 30] {
            board.pin(location(), message(id));
        }

        let (tracker, feed) = scroll_channel();
        let resolver = PinnedMessageResolver::anchored(
            location(),
            ResolverConfig::default(),
            board.clone(),
            feed,
        );
        let mut rx = resolver.subscribe();

        tracker.request_jump(JumpRequest {
            target: MessageId(10),
            allow_replace_upward: true,
        });

        let handle = next_value(&mut rx).await.expect("pin must resolve");
        assert_eq!(handle.message.id, MessageId(30));
        assert_eq!(handle.top_message_id, MessageId(30));
    }

    #[tokio::test]
    async fn memory_board_end_to_end_tracks_scrolling_and_unpins() {
        let board = Arc::new(MemoryPinBoard::new());
        for id in [10u64, 20, 30] {
            board.pin(location(), message(id));
        }

        let (tracker, feed) = scroll_channel();
        let resolver = PinnedMessageResolver::anchored(
            location(),
            ResolverConfig::default(),
            board.clone(),
            feed,
        );
        let mut rx = resolver.subscribe();

        tracker.set_visible_range(Some(VisibleRange::new(MessageId(25), MessageId(15))));
        let handle = next_value(&mut rx).await.expect("pin must resolve");
        assert_eq!(handle.message.id, MessageId(20));
        assert_eq!(handle.index_in_set, 1);
        assert_eq!(handle.total_count, 3);
        assert_eq!(handle.top_message_id, MessageId(30));

        // Unpinning the newest pin updates both the count and the top id.
        // The count-1 lookup and the window query re-emit independently, so
        // wait for the settled value rather than the first change.
        board.unpin(location(), MessageId(30));
        let handle = timeout(WAIT, async {
            loop {
                rx.changed().await.expect("resolver is alive");
                let value = rx.borrow_and_update().clone();
                if let Some(handle) = value {
                    if handle.total_count == 2 && handle.top_message_id == MessageId(20) {
                        return handle;
                    }
                }
            }
        })
        .await
        .expect("resolution timeout");
        assert_eq!(handle.message.id, MessageId(20));

        resolver.shutdown().await.expect("clean shutdown");
    }
}
