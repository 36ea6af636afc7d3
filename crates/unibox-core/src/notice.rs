//! Transient user-facing notices.

use std::time::Duration;

use tokio::time::Instant;

/// A short message that dismisses itself after a delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Headline.
    pub title: String,
    /// Detail text.
    pub body: String,
    /// How long the notice stays up.
    pub dismiss_after: Duration,
    raised_at: Instant,
}

impl Notice {
    /// Raises a notice now.
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>, dismiss_after: Duration) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            dismiss_after,
            raised_at: Instant::now(),
        }
    }

    /// Notice for `count` newly arrived messages in `account`.
    #[must_use]
    pub fn new_mail(account: &str, count: usize, dismiss_after: Duration) -> Self {
        let title = if count == 1 {
            "1 new message".to_string()
        } else {
            format!("{count} new messages")
        };
        Self::new(title, account, dismiss_after)
    }

    /// Whether the notice has dismissed itself.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.raised_at.elapsed() >= self.dismiss_after
    }
}
