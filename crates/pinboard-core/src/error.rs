use thiserror::Error;

/// Infrastructure failures surfaced by a running resolver.
///
/// The domain itself has no user-visible error channel: holes restart the
/// query, an unknown anchor produces no output, and an empty pinned set
/// resolves to `None`. What remains is upstream plumbing going away.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolverError {
    /// The window source closed a subscription the resolver still needed.
    #[error("history window source closed its subscription stream")]
    SourceClosed,
    /// The scroll tracker side of the feed was dropped.
    #[error("scroll anchor tracker was dropped")]
    TrackerClosed,
    /// The resolver task was detached before it finished shutting down.
    #[error("resolver task detached")]
    Detached,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_stable() {
        assert_eq!(
            ResolverError::SourceClosed.to_string(),
            "history window source closed its subscription stream"
        );
        assert_eq!(
            ResolverError::TrackerClosed.to_string(),
            "scroll anchor tracker was dropped"
        );
    }
}
