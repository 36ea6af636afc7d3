//! Microsoft Graph mail adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use unibox_oauth::Token;
use url::Url;

use super::MailProvider;
use super::http::{ApiSession, endpoint};
use super::mail::{Folder, FolderKey, Message, ProviderError};
use super::outgoing::OutgoingMessage;
use crate::account::ProviderKind;

/// Production Graph API root.
pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Graph well-known folder names and the key each stands for.
const WELL_KNOWN_FOLDERS: &[(&str, FolderKey)] = &[
    ("inbox", FolderKey::Inbox),
    ("sentitems", FolderKey::Sent),
    ("drafts", FolderKey::Drafts),
    ("archive", FolderKey::Archive),
    ("junkemail", FolderKey::Spam),
    ("deleteditems", FolderKey::Trash),
];

const MESSAGE_SELECT_FIELDS: &str =
    "id,subject,from,receivedDateTime,isRead,flag,bodyPreview,internetMessageId";

/// Outlook / Microsoft 365 mailbox of one account.
#[derive(Debug)]
pub struct GraphProvider {
    session: ApiSession,
    base: Url,
}

impl GraphProvider {
    /// Creates an adapter rooted at `base` (normally [`GRAPH_API_BASE`]).
    #[must_use]
    pub const fn new(session: ApiSession, base: Url) -> Self {
        Self { session, base }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut all = vec!["me"];
        all.extend_from_slice(segments);
        endpoint(&self.base, &all)
    }

    /// Resolves a well-known folder name to its ID; `None` when the mailbox
    /// does not have that folder.
    async fn well_known_id(&self, name: &str) -> Result<Option<String>, ProviderError> {
        let mut url = self.url(&["mailFolders", name])?;
        url.query_pairs_mut().append_pair("$select", "id");
        match self.session.get_json::<FolderId>(&url).await {
            Ok(folder) => Ok(Some(folder.id)),
            Err(ProviderError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl MailProvider for GraphProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Microsoft
    }

    async fn list_folders(&self) -> Result<Vec<Folder>, ProviderError> {
        let mut url = self.url(&["mailFolders"])?;
        url.query_pairs_mut().append_pair("$top", "100");
        let page: FolderPage = self.session.get_json(&url).await?;

        let mut folders: Vec<Folder> = page
            .value
            .into_iter()
            .map(|f| Folder {
                id: f.id,
                name: f.display_name,
                well_known: None,
                unread_count: f.unread_item_count,
                total_count: f.total_item_count,
            })
            .collect();

        for (name, key) in WELL_KNOWN_FOLDERS {
            let Some(id) = self.well_known_id(name).await? else {
                continue;
            };
            if let Some(folder) = folders.iter_mut().find(|f| f.id == id) {
                folder.well_known = Some(*key);
            } else {
                debug!(name, "well-known folder not in top-level listing");
            }
        }

        Ok(folders)
    }

    async fn list_messages(
        &self,
        folder_id: &str,
        page_size: usize,
    ) -> Result<Vec<Message>, ProviderError> {
        let mut url = self.url(&["mailFolders", folder_id, "messages"])?;
        url.query_pairs_mut()
            .append_pair("$top", &page_size.to_string())
            .append_pair("$select", MESSAGE_SELECT_FIELDS)
            .append_pair("$orderby", "receivedDateTime desc");

        let page: MessagePage = self.session.get_json(&url).await?;
        Ok(page
            .value
            .into_iter()
            .map(GraphMessage::into_message)
            .collect())
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<(), ProviderError> {
        let url = self.url(&["sendMail"])?;
        self.session.post_json(&url, &SendMail::from(message)).await
    }

    async fn account_address(&self) -> Result<String, ProviderError> {
        let mut url = self.url(&[])?;
        url.query_pairs_mut()
            .append_pair("$select", "mail,userPrincipalName");
        let user: GraphUser = self.session.get_json(&url).await?;
        user.mail
            .filter(|m| !m.is_empty())
            .or(user.user_principal_name)
            .ok_or_else(|| ProviderError::Decode("user has no mail address".to_string()))
    }

    async fn current_token(&self) -> Token {
        self.session.token().await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    mail: Option<String>,
    user_principal_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FolderId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FolderPage {
    #[serde(default)]
    value: Vec<GraphMailFolder>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMailFolder {
    id: String,
    display_name: String,
    unread_item_count: Option<u32>,
    total_item_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct MessagePage {
    #[serde(default)]
    value: Vec<GraphMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    subject: Option<String>,
    from: Option<Recipient>,
    received_date_time: Option<String>,
    #[serde(default)]
    is_read: bool,
    flag: Option<GraphFlag>,
    body_preview: Option<String>,
    internet_message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphFlag {
    flag_status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Recipient {
    email_address: EmailAddress,
}

#[derive(Debug, Serialize, Deserialize)]
struct EmailAddress {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    address: Option<String>,
}

impl Recipient {
    fn new(address: &str) -> Self {
        Self {
            email_address: EmailAddress {
                name: None,
                address: Some(address.to_string()),
            },
        }
    }

    fn display(&self) -> String {
        let name = self
            .email_address
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());
        let address = self.email_address.address.as_deref().unwrap_or_default();
        match name {
            Some(name) if name != address => format!("{name} <{address}>"),
            _ => address.to_string(),
        }
    }
}

impl GraphMessage {
    fn into_message(self) -> Message {
        let received_at = self
            .received_date_time
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map_or_else(Utc::now, |dt| dt.with_timezone(&Utc));
        let is_starred = self
            .flag
            .and_then(|f| f.flag_status)
            .is_some_and(|status| status == "flagged");

        Message {
            id: self.id,
            subject: self.subject.unwrap_or_default(),
            from: self.from.as_ref().map(Recipient::display).unwrap_or_default(),
            received_at,
            is_read: self.is_read,
            is_starred,
            body_preview: self.body_preview.unwrap_or_default(),
            body: None,
            internet_message_id: self.internet_message_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMail {
    message: SendMessage,
    save_to_sent_items: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessage {
    subject: String,
    body: SendBody,
    to_recipients: Vec<Recipient>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cc_recipients: Vec<Recipient>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    bcc_recipients: Vec<Recipient>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendBody {
    content_type: &'static str,
    content: String,
}

impl From<&OutgoingMessage> for SendMail {
    fn from(message: &OutgoingMessage) -> Self {
        let recipients = |list: &[String]| -> Vec<Recipient> {
            list.iter().map(|a| Recipient::new(a)).collect()
        };
        Self {
            message: SendMessage {
                subject: message.subject.clone(),
                body: SendBody {
                    content_type: "Text",
                    content: message.body.clone(),
                },
                to_recipients: recipients(&message.to),
                cc_recipients: recipients(&message.cc),
                bcc_recipients: recipients(&message.bcc),
            },
            save_to_sent_items: true,
        }
    }
}
