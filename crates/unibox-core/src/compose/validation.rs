//! Draft validation.

use std::fmt;

use super::ComposeDraft;

/// A draft field that can fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComposeField {
    /// Primary recipients.
    To,
    /// Carbon copy recipients.
    Cc,
    /// Blind carbon copy recipients.
    Bcc,
    /// Subject line.
    Subject,
    /// Message body.
    Body,
}

impl ComposeField {
    /// Form field name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::To => "to",
            Self::Cc => "cc",
            Self::Bcc => "bcc",
            Self::Subject => "subject",
            Self::Body => "body",
        }
    }
}

/// One problem found in a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeIssue {
    /// A required field is blank.
    Empty(ComposeField),
    /// A recipient entry is not an address.
    InvalidRecipient {
        /// Field holding the entry.
        field: ComposeField,
        /// The entry as typed.
        address: String,
    },
    /// A header field contains a line break.
    LineBreak(ComposeField),
}

impl ComposeIssue {
    /// Get human-readable error message.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Empty(ComposeField::To) => "At least one recipient is required".to_string(),
            Self::Empty(ComposeField::Subject) => "Subject is required".to_string(),
            Self::Empty(ComposeField::Body) => "Message body is required".to_string(),
            Self::Empty(field) => format!("{} is required", field.as_str()),
            Self::InvalidRecipient { address, .. } => {
                format!("\"{address}\" is not an email address")
            }
            Self::LineBreak(field) => format!("{} must be a single line", field.as_str()),
        }
    }

    /// Get the field this issue relates to.
    #[must_use]
    pub const fn field(&self) -> ComposeField {
        match self {
            Self::Empty(field) | Self::LineBreak(field) | Self::InvalidRecipient { field, .. } => {
                *field
            }
        }
    }
}

/// A draft that cannot be sent, with every problem found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeError {
    issues: Vec<ComposeIssue>,
}

impl ComposeError {
    /// All issues, in field order.
    #[must_use]
    pub fn issues(&self) -> &[ComposeIssue] {
        &self.issues
    }

    /// Fields with at least one issue.
    #[must_use]
    pub fn fields(&self) -> Vec<ComposeField> {
        let mut fields: Vec<_> = self.issues.iter().map(ComposeIssue::field).collect();
        fields.dedup();
        fields
    }

    /// Whether `field` has an issue.
    #[must_use]
    pub fn has(&self, field: ComposeField) -> bool {
        self.issues.iter().any(|issue| issue.field() == field)
    }
}

impl fmt::Display for ComposeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            f.write_str(&issue.message())?;
        }
        Ok(())
    }
}

impl std::error::Error for ComposeError {}

/// Validate a draft before it is sent.
///
/// # Errors
///
/// Returns a [`ComposeError`] listing every blank required field, every
/// recipient entry without an `@` and every header field spanning lines.
pub fn validate_draft(draft: &ComposeDraft) -> Result<(), ComposeError> {
    let mut issues = Vec::new();

    if split_recipients(&draft.to).is_empty() {
        issues.push(ComposeIssue::Empty(ComposeField::To));
    }
    for (field, value) in [
        (ComposeField::To, &draft.to),
        (ComposeField::Cc, &draft.cc),
        (ComposeField::Bcc, &draft.bcc),
    ] {
        issues.extend(
            split_recipients(value)
                .into_iter()
                .filter(|address| !is_valid_recipient(address))
                .map(|address| ComposeIssue::InvalidRecipient { field, address }),
        );
    }
    if draft.subject.trim().is_empty() {
        issues.push(ComposeIssue::Empty(ComposeField::Subject));
    }
    issues.extend(
        [
            (ComposeField::To, &draft.to),
            (ComposeField::Cc, &draft.cc),
            (ComposeField::Bcc, &draft.bcc),
            (ComposeField::Subject, &draft.subject),
        ]
        .into_iter()
        .filter(|(_, value)| value.contains(['\r', '\n']))
        .map(|(field, _)| ComposeIssue::LineBreak(field)),
    );
    if draft.body.trim().is_empty() {
        issues.push(ComposeIssue::Empty(ComposeField::Body));
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ComposeError { issues })
    }
}

/// Splits a comma-separated recipient field, dropping blank entries.
#[must_use]
pub fn split_recipients(field: &str) -> Vec<String> {
    field
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn is_valid_recipient(address: &str) -> bool {
    match address.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty(),
        None => false,
    }
}
