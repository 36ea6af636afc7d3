//! Compose, reply and forward drafts.
//!
//! A [`ComposeDraft`] is plain form state. It is validated and consumed into
//! an [`OutgoingMessage`] only when sent; drafts are never stored.

mod validation;

pub use validation::{ComposeError, ComposeField, ComposeIssue, split_recipients, validate_draft};

use crate::service::{Message, OutgoingMessage};

/// How a draft was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComposeMode {
    /// New message.
    #[default]
    Compose,
    /// Answer to the sender.
    Reply,
    /// Pass a message on.
    Forward,
}

/// Editable message fields.
///
/// Recipient fields hold comma-separated addresses as typed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComposeDraft {
    /// Primary recipients.
    pub to: String,
    /// Carbon copy recipients.
    pub cc: String,
    /// Blind carbon copy recipients.
    pub bcc: String,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// How the draft was started.
    pub mode: ComposeMode,
    /// `Message-ID` of the message being answered.
    pub in_reply_to: Option<String>,
}

impl ComposeDraft {
    /// Blank draft.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to the sender of `original`, quoting its preview.
    #[must_use]
    pub fn reply(original: &Message) -> Self {
        Self {
            to: original.sender_address().to_string(),
            subject: reply_subject(&original.subject),
            body: format!("\n\n{}", quote(&original.body_preview)),
            mode: ComposeMode::Reply,
            in_reply_to: original.internet_message_id.clone(),
            ..Self::default()
        }
    }

    /// Forward `original` with a quoted header block.
    #[must_use]
    pub fn forward(original: &Message) -> Self {
        let header = format!(
            "From: {}\nDate: {}\nSubject: {}",
            original.from,
            original.received_at.format("%a, %d %b %Y %H:%M"),
            original.subject
        );
        Self {
            subject: forward_subject(&original.subject),
            body: format!(
                "\n\n---------- Forwarded message ----------\n{}\n\n{}",
                quote(&header),
                original.body_preview
            ),
            mode: ComposeMode::Forward,
            ..Self::default()
        }
    }

    /// Check the draft without consuming it.
    ///
    /// # Errors
    ///
    /// Returns a [`ComposeError`] listing every invalid field.
    pub fn validate(&self) -> Result<(), ComposeError> {
        validate_draft(self)
    }

    /// Validate and turn the draft into a send payload from `from`.
    ///
    /// # Errors
    ///
    /// Returns a [`ComposeError`] if the draft is incomplete.
    pub fn into_outgoing(self, from: &str) -> Result<OutgoingMessage, ComposeError> {
        self.validate()?;
        Ok(OutgoingMessage {
            from: from.to_string(),
            to: split_recipients(&self.to),
            cc: split_recipients(&self.cc),
            bcc: split_recipients(&self.bcc),
            subject: self.subject.trim().to_string(),
            body: self.body,
            in_reply_to: self.in_reply_to,
        })
    }
}

/// `Re:` prefixed subject; an existing prefix in any case is kept as is.
#[must_use]
pub fn reply_subject(subject: &str) -> String {
    prefixed(subject, "Re:", &["re:"])
}

/// `Fwd:` prefixed subject; existing `Fwd:` or `Fw:` prefixes are kept.
#[must_use]
pub fn forward_subject(subject: &str) -> String {
    prefixed(subject, "Fwd:", &["fwd:", "fw:"])
}

fn prefixed(subject: &str, prefix: &str, existing: &[&str]) -> String {
    let single = one_line(subject);
    let trimmed = single.trim();
    let has_prefix = existing.iter().any(|p| {
        trimmed
            .get(..p.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(p))
    });
    if has_prefix {
        trimmed.to_string()
    } else if trimmed.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix} {trimmed}")
    }
}

/// Joins the lines of a header value taken from a received message.
fn one_line(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    use super::*;

    fn original(subject: &str) -> Message {
        Message {
            id: "m1".into(),
            subject: subject.into(),
            from: "Alice <alice@example.com>".into(),
            received_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            is_read: true,
            is_starred: false,
            body_preview: "Lunch?\nAt noon".into(),
            body: None,
            internet_message_id: Some("<abc@example.com>".into()),
        }
    }

    #[test]
    fn reply_prefix_is_idempotent() {
        assert_eq!(reply_subject("Hello"), "Re: Hello");
        assert_eq!(reply_subject("Re: Hello"), "Re: Hello");
        assert_eq!(reply_subject("RE: Hello"), "RE: Hello");
        assert_eq!(reply_subject("re:Hello"), "re:Hello");
        assert_eq!(reply_subject(""), "Re:");
    }

    #[test]
    fn forward_prefix_accepts_fw() {
        assert_eq!(forward_subject("Hello"), "Fwd: Hello");
        assert_eq!(forward_subject("Fwd: Hello"), "Fwd: Hello");
        assert_eq!(forward_subject("FW: Hello"), "FW: Hello");
        assert_eq!(forward_subject("Re: Hello"), "Fwd: Re: Hello");
    }

    #[test]
    fn reply_addresses_sender_and_quotes_preview() {
        let draft = ComposeDraft::reply(&original("Lunch"));
        assert_eq!(draft.mode, ComposeMode::Reply);
        assert_eq!(draft.to, "alice@example.com");
        assert_eq!(draft.subject, "Re: Lunch");
        assert_eq!(draft.body, "\n\n> Lunch?\n> At noon");
        assert_eq!(draft.in_reply_to.as_deref(), Some("<abc@example.com>"));
    }

    #[test]
    fn received_subject_with_line_breaks_is_joined() {
        let draft = ComposeDraft::reply(&original("Invoice\r\nBcc: spy@evil.example"));
        assert_eq!(draft.subject, "Re: Invoice Bcc: spy@evil.example");
        assert!(draft.validate().is_ok());
        assert_eq!(forward_subject("Fwd:\n Notes"), "Fwd: Notes");
    }

    #[test]
    fn forward_quotes_header_block() {
        let draft = ComposeDraft::forward(&original("Lunch"));
        assert_eq!(draft.mode, ComposeMode::Forward);
        assert!(draft.to.is_empty());
        assert_eq!(draft.subject, "Fwd: Lunch");
        assert!(draft.body.contains("> From: Alice <alice@example.com>\n"));
        assert!(draft.body.contains("> Date: Fri, 01 Mar 2024 09:30\n"));
        assert!(draft.body.contains("> Subject: Lunch\n\nLunch?\nAt noon"));
    }

    #[test]
    fn into_outgoing_splits_recipients() {
        let draft = ComposeDraft {
            to: "a@example.com, b@example.com".into(),
            bcc: "c@example.com".into(),
            subject: " Hi ".into(),
            body: "Hello".into(),
            ..ComposeDraft::new()
        };
        let msg = draft.into_outgoing("me@example.com").unwrap();
        assert_eq!(msg.from, "me@example.com");
        assert_eq!(msg.to, vec!["a@example.com", "b@example.com"]);
        assert!(msg.cc.is_empty());
        assert_eq!(msg.bcc, vec!["c@example.com"]);
        assert_eq!(msg.subject, "Hi");
    }

    #[test]
    fn incomplete_draft_is_not_converted() {
        let err = ComposeDraft::new().into_outgoing("me@example.com").unwrap_err();
        assert!(err.has(ComposeField::To));
        assert!(err.has(ComposeField::Subject));
        assert!(err.has(ComposeField::Body));
    }

    proptest! {
        #[test]
        fn prefixing_twice_equals_prefixing_once(subject in "\\PC{0,40}") {
            let once = reply_subject(&subject);
            prop_assert_eq!(reply_subject(&once), once);
            let once = forward_subject(&subject);
            prop_assert_eq!(forward_subject(&once), once);
        }
    }
}
