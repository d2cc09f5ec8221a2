use std::{env, sync::Arc, time::Duration};

use pinboard_core::{
    ChatId, ChatLocation, JumpRequest, MessageId, PinnedMessage, ResolverConfig, VisibleRange,
};
use pinboard_resolver::{MemoryPinBoard, PinnedMessageResolver, ResolverHandle, scroll_channel};
use tokio::time::sleep;
use tracing::info;

mod logging;

/// Lets resolver tasks drain their snapshot channels between steps.
const SETTLE: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() {
    logging::init();

    let pin_count: u64 = env::var("PINBOARD_PIN_COUNT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(12);

    let location = ChatLocation::chat(ChatId(1));
    let board = Arc::new(MemoryPinBoard::new());
    for n in 1..=pin_count {
        board.pin(
            location,
            PinnedMessage {
                id: MessageId(n * 10),
                author: "@smoke:example.org".to_owned(),
                body: format!("pinned message {n}"),
                pinned_at_ms: 1_700_000_000_000 + n,
            },
        );
    }
    info!(pins = pin_count, "pin board seeded");

    let (tracker, feed) = scroll_channel();
    let anchored = PinnedMessageResolver::anchored(
        location,
        ResolverConfig::default(),
        board.clone(),
        feed,
    );
    let latest = PinnedMessageResolver::latest(location, ResolverConfig::default(), board.clone());

    sleep(SETTLE).await;
    report("latest before any scroll", &latest);
    report("anchored before any scroll", &anchored);

    // Scroll to the middle of the history.
    let middle = MessageId(pin_count / 2 * 10);
    tracker.set_visible_range(Some(VisibleRange::new(
        middle,
        MessageId(middle.0.saturating_sub(10)),
    )));
    sleep(SETTLE).await;
    report("anchored mid-history", &anchored);

    // Jump to the very first pin; this should fall back to the newest one.
    tracker.request_jump(JumpRequest {
        target: MessageId(10),
        allow_replace_upward: true,
    });
    sleep(SETTLE).await;
    report("anchored after jump to first pin", &anchored);

    // Scrolling up past the jump target releases the jump anchor.
    tracker.set_visible_range(Some(VisibleRange::new(MessageId(5), MessageId(5))));
    sleep(SETTLE).await;
    report("anchored after scrolling above the jump", &anchored);

    // Unpin the newest message; both modes should notice.
    board.unpin(location, MessageId(pin_count * 10));
    sleep(SETTLE).await;
    report("latest after unpin", &latest);
    report("anchored after unpin", &anchored);

    if let Err(err) = anchored.shutdown().await {
        eprintln!("anchored resolver did not shut down cleanly: {err}");
        std::process::exit(1);
    }
    if let Err(err) = latest.shutdown().await {
        eprintln!("latest resolver did not shut down cleanly: {err}");
        std::process::exit(1);
    }
    println!("Smoke run complete.");
}

fn report(label: &str, resolver: &ResolverHandle) {
    match resolver.current() {
        Some(handle) => println!(
            "{label}: {} ({} of {}, top {})",
            handle.message.id,
            handle.index_in_set + 1,
            handle.total_count,
            handle.top_message_id
        ),
        None => println!("{label}: nothing pinned"),
    }
}
