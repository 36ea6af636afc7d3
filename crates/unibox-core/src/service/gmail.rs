//! Gmail REST API adapter.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tokio::task::JoinSet;
use tracing::debug;
use unibox_oauth::Token;
use url::Url;

use super::MailProvider;
use super::http::{ApiSession, endpoint};
use super::mail::{Folder, FolderKey, Message, ProviderError};
use super::outgoing::OutgoingMessage;
use crate::account::ProviderKind;

/// Production Gmail API root.
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Folder ID standing in for "archive", which Gmail has no label for.
pub const ARCHIVE_FOLDER_ID: &str = "ARCHIVE";

/// Mail that is in none of the system folders counts as archived.
const ARCHIVE_QUERY: &str = "-in:inbox -in:spam -in:trash -in:sent -in:drafts";

/// Message metadata fetched concurrently per listing.
const MAX_PARALLEL_FETCHES: usize = 8;

/// System label IDs that correspond to standard folders.
fn well_known_label(id: &str) -> Option<FolderKey> {
    match id {
        "INBOX" => Some(FolderKey::Inbox),
        "SENT" => Some(FolderKey::Sent),
        "DRAFT" => Some(FolderKey::Drafts),
        "SPAM" => Some(FolderKey::Spam),
        "TRASH" => Some(FolderKey::Trash),
        _ => None,
    }
}

/// Gmail mailbox of one account.
#[derive(Debug)]
pub struct GmailProvider {
    session: Arc<ApiSession>,
    base: Url,
}

impl GmailProvider {
    /// Creates an adapter rooted at `base` (normally [`GMAIL_API_BASE`]).
    #[must_use]
    pub fn new(session: ApiSession, base: Url) -> Self {
        Self {
            session: Arc::new(session),
            base,
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut all = vec!["users", "me"];
        all.extend_from_slice(segments);
        endpoint(&self.base, &all)
    }
}

#[async_trait]
impl MailProvider for GmailProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gmail
    }

    async fn list_folders(&self) -> Result<Vec<Folder>, ProviderError> {
        let list: LabelList = self.session.get_json(&self.url(&["labels"])?).await?;

        let mut folders: Vec<Folder> = list
            .labels
            .into_iter()
            .filter_map(|label| {
                let well_known = well_known_label(&label.id);
                // Remaining system labels (UNREAD, STARRED, CATEGORY_*) are
                // message states, not folders.
                if well_known.is_none() && label.label_type.as_deref() == Some("system") {
                    return None;
                }
                Some(Folder {
                    id: label.id,
                    name: label.name,
                    well_known,
                    unread_count: label.messages_unread,
                    total_count: label.messages_total,
                })
            })
            .collect();

        folders.push(Folder::new(ARCHIVE_FOLDER_ID, "Archive").well_known(FolderKey::Archive));
        debug!(count = folders.len(), "listed gmail labels");
        Ok(folders)
    }

    async fn list_messages(
        &self,
        folder_id: &str,
        page_size: usize,
    ) -> Result<Vec<Message>, ProviderError> {
        let mut url = self.url(&["messages"])?;
        {
            let mut query = url.query_pairs_mut();
            if folder_id == ARCHIVE_FOLDER_ID {
                query.append_pair("q", ARCHIVE_QUERY);
            } else {
                query.append_pair("labelIds", folder_id);
            }
            query.append_pair("maxResults", &page_size.to_string());
        }

        let list: MessageList = self.session.get_json(&url).await?;
        let ids: Vec<String> = list
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|stub| stub.id)
            .collect();

        let mut messages: Vec<Option<Message>> = vec![None; ids.len()];
        let mut tasks = JoinSet::new();
        for (index, id) in ids.into_iter().enumerate() {
            if tasks.len() >= MAX_PARALLEL_FETCHES
                && let Some(done) = tasks.join_next().await
            {
                let (i, msg) = joined(done)?;
                messages[i] = msg;
            }
            let session = Arc::clone(&self.session);
            let url = self.url(&["messages", id.as_str()])?;
            tasks.spawn(async move { (index, fetch_metadata(&session, url).await) });
        }
        while let Some(done) = tasks.join_next().await {
            let (i, msg) = joined(done)?;
            messages[i] = msg;
        }

        Ok(messages.into_iter().flatten().collect())
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<(), ProviderError> {
        let raw = URL_SAFE_NO_PAD.encode(message.to_rfc5322().as_bytes());
        let url = self.url(&["messages", "send"])?;
        self.session
            .post_json(&url, &serde_json::json!({ "raw": raw }))
            .await
    }

    async fn account_address(&self) -> Result<String, ProviderError> {
        let profile: GmailProfile = self.session.get_json(&self.url(&["profile"])?).await?;
        Ok(profile.email_address)
    }

    async fn current_token(&self) -> Token {
        self.session.token().await
    }
}

/// A message deleted between the listing and its fetch is skipped.
fn joined(
    result: Result<(usize, Result<Message, ProviderError>), tokio::task::JoinError>,
) -> Result<(usize, Option<Message>), ProviderError> {
    let (index, message) =
        result.map_err(|e| ProviderError::Network(format!("message fetch aborted: {e}")))?;
    match message {
        Ok(message) => Ok((index, Some(message))),
        Err(ProviderError::Api { status: 404, message }) => {
            debug!(index, %message, "listed message is gone, skipping");
            Ok((index, None))
        }
        Err(e) => Err(e),
    }
}

async fn fetch_metadata(session: &ApiSession, mut url: Url) -> Result<Message, ProviderError> {
    url.query_pairs_mut()
        .append_pair("format", "metadata")
        .append_pair("metadataHeaders", "Subject")
        .append_pair("metadataHeaders", "From")
        .append_pair("metadataHeaders", "Message-ID");
    let message: GmailMessage = session.get_json(&url).await?;
    Ok(message.into_message())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailProfile {
    email_address: String,
}

#[derive(Debug, Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<GmailLabel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailLabel {
    id: String,
    name: String,
    #[serde(rename = "type")]
    label_type: Option<String>,
    messages_total: Option<u32>,
    messages_unread: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    messages: Option<Vec<MessageStub>>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    #[serde(default)]
    label_ids: Vec<String>,
    snippet: Option<String>,
    internal_date: Option<String>,
    payload: Option<GmailPayload>,
}

#[derive(Debug, Deserialize)]
struct GmailPayload {
    #[serde(default)]
    headers: Vec<GmailHeader>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

impl GmailMessage {
    fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    fn has_label(&self, label: &str) -> bool {
        self.label_ids.iter().any(|l| l == label)
    }

    fn into_message(self) -> Message {
        // internalDate is milliseconds since the epoch, sent as a string.
        let received_at = self
            .internal_date
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        Message {
            subject: self.header("Subject").unwrap_or_default().to_string(),
            from: self.header("From").unwrap_or_default().to_string(),
            internet_message_id: self.header("Message-ID").map(str::to_string),
            is_read: !self.has_label("UNREAD"),
            is_starred: self.has_label("STARRED"),
            body_preview: self
                .snippet
                .as_deref()
                .map(decode_entities)
                .unwrap_or_default(),
            body: None,
            received_at,
            id: self.id,
        }
    }
}

/// Gmail snippets arrive HTML-escaped.
fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
