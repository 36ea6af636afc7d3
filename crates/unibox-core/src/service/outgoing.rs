//! Outbound message payload.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;

/// An email message to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Sender address.
    pub from: String,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// CC addresses.
    pub cc: Vec<String>,
    /// BCC addresses.
    pub bcc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub body: String,
    /// `Message-ID` of the message being answered.
    pub in_reply_to: Option<String>,
}

impl OutgoingMessage {
    /// Creates a new outgoing message.
    #[must_use]
    pub fn new(
        from: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.into(),
            body: body.into(),
            in_reply_to: None,
        }
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.to.push(recipient.into());
        self
    }

    /// Adds a CC recipient.
    #[must_use]
    pub fn cc(mut self, recipient: impl Into<String>) -> Self {
        self.cc.push(recipient.into());
        self
    }

    /// Adds a BCC recipient.
    #[must_use]
    pub fn bcc(mut self, recipient: impl Into<String>) -> Self {
        self.bcc.push(recipient.into());
        self
    }

    /// Threads the message under an earlier one.
    #[must_use]
    pub fn in_reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.in_reply_to = Some(message_id.into());
        self
    }

    /// Builds the RFC 5322 formatted message.
    ///
    /// `Bcc` is kept as a header; the sending API delivers to it and strips it.
    #[must_use]
    pub fn to_rfc5322(&self) -> String {
        use std::fmt::Write;

        let mut message = String::new();

        let _ = writeln!(message, "From: {}\r", single_line(&self.from));
        for (name, list) in [("To", &self.to), ("Cc", &self.cc), ("Bcc", &self.bcc)] {
            if !list.is_empty() {
                let _ = writeln!(message, "{name}: {}\r", single_line(&list.join(", ")));
            }
        }
        let _ = writeln!(message, "Subject: {}\r", encode_header(&single_line(&self.subject)));
        let _ = writeln!(message, "Date: {}\r", Utc::now().to_rfc2822());
        if let Some(id) = &self.in_reply_to {
            let id = single_line(id);
            let _ = writeln!(message, "In-Reply-To: {id}\r");
            let _ = writeln!(message, "References: {id}\r");
        }
        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        message.push_str("Content-Transfer-Encoding: 8bit\r\n");

        message.push_str("\r\n");

        // Bare LF in the body becomes CRLF.
        for line in self.body.lines() {
            message.push_str(line);
            message.push_str("\r\n");
        }

        message
    }

    /// Returns all recipients (to, cc, bcc).
    #[must_use]
    pub fn all_recipients(&self) -> Vec<&str> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .map(String::as_str)
            .collect()
    }
}

/// Header values never span lines; CR and LF become spaces.
fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// RFC 2047 encoded-word for non-ASCII header values.
fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(value.as_bytes()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> OutgoingMessage {
        OutgoingMessage::new("me@example.com", "Hello", "line one\nline two")
            .to("a@example.com")
            .to("b@example.com")
            .cc("c@example.com")
            .bcc("d@example.com")
    }

    #[test]
    fn rfc5322_headers_and_body() {
        let raw = sample().to_rfc5322();
        assert!(raw.starts_with("From: me@example.com\r\n"));
        assert!(raw.contains("To: a@example.com, b@example.com\r\n"));
        assert!(raw.contains("Cc: c@example.com\r\n"));
        assert!(raw.contains("Bcc: d@example.com\r\n"));
        assert!(raw.contains("Subject: Hello\r\n"));
        assert!(raw.ends_with("\r\n\r\nline one\r\nline two\r\n"));
        assert!(!raw.contains("In-Reply-To"));
    }

    #[test]
    fn reply_threads_with_in_reply_to() {
        let raw = sample().in_reply_to("<abc@mail.example.com>").to_rfc5322();
        assert!(raw.contains("In-Reply-To: <abc@mail.example.com>\r\n"));
        assert!(raw.contains("References: <abc@mail.example.com>\r\n"));
    }

    #[test]
    fn non_ascii_subject_is_encoded() {
        let raw = OutgoingMessage::new("me@example.com", "Grüße", "").to_rfc5322();
        assert!(raw.contains("Subject: =?UTF-8?B?R3LDvMOfZQ==?=\r\n"));
    }

    #[test]
    fn header_values_cannot_add_headers() {
        let raw = OutgoingMessage::new("me@example.com", "Invoice\r\nBcc: spy@evil.example", "")
            .to("boss@example.com")
            .in_reply_to("<a@example.com>\nX-Extra: 1")
            .to_rfc5322();
        let (headers, _) = raw.split_once("\r\n\r\n").unwrap();
        let names: Vec<&str> = headers
            .split("\r\n")
            .map(|line| line.split_once(':').unwrap().0)
            .collect();
        assert_eq!(
            names,
            vec![
                "From",
                "To",
                "Subject",
                "Date",
                "In-Reply-To",
                "References",
                "MIME-Version",
                "Content-Type",
                "Content-Transfer-Encoding"
            ]
        );
        assert!(headers.contains("Subject: Invoice  Bcc: spy@evil.example\r\n"));
    }

    #[test]
    fn all_recipients_in_order() {
        assert_eq!(
            sample().all_recipients(),
            vec![
                "a@example.com",
                "b@example.com",
                "c@example.com",
                "d@example.com"
            ]
        );
    }
}
