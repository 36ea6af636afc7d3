//! In-memory provider doubles for unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use unibox_oauth::Token;

use crate::account::{MailAccountConnection, ProviderKind};
use crate::service::{
    Folder, FolderKey, MailProvider, Message, OutgoingMessage, ProviderError, ProviderFactory,
};
use crate::Result;

pub fn message(id: &str, subject: &str) -> Message {
    Message {
        id: id.into(),
        subject: subject.into(),
        from: "Sender <sender@example.com>".into(),
        received_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        is_read: false,
        is_starred: false,
        body_preview: format!("preview of {subject}"),
        body: None,
        internet_message_id: None,
    }
}

pub fn messages(ids: &[&str]) -> Vec<Message> {
    ids.iter().map(|id| message(id, &format!("Subject {id}"))).collect()
}

pub fn connection(email: &str) -> MailAccountConnection {
    MailAccountConnection::new(ProviderKind::Gmail, email, Token::bearer(format!("tok-{email}")))
}

/// Provider whose listings come from a script.
///
/// Each `list_messages` call pops the next scripted listing for the folder;
/// the last one repeats.
#[derive(Debug)]
pub struct FakeProvider {
    folders: Vec<Folder>,
    listings: Mutex<HashMap<String, VecDeque<std::result::Result<Vec<Message>, ProviderError>>>>,
    pub list_calls: AtomicUsize,
    pub folder_calls: AtomicUsize,
    pub sent: Mutex<Vec<OutgoingMessage>>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            folders: vec![
                Folder::new("INBOX", "Inbox").well_known(FolderKey::Inbox),
                Folder::new("SENT", "Sent").well_known(FolderKey::Sent),
                Folder::new("Label_7", "Old Archive"),
            ],
            listings: Mutex::new(HashMap::new()),
            list_calls: AtomicUsize::new(0),
            folder_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn script(
        &self,
        folder_id: &str,
        listing: std::result::Result<Vec<Message>, ProviderError>,
    ) {
        self.listings
            .lock()
            .unwrap()
            .entry(folder_id.to_string())
            .or_default()
            .push_back(listing);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gmail
    }

    async fn list_folders(&self) -> std::result::Result<Vec<Folder>, ProviderError> {
        self.folder_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.folders.clone())
    }

    async fn list_messages(
        &self,
        folder_id: &str,
        _page_size: usize,
    ) -> std::result::Result<Vec<Message>, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut listings = self.listings.lock().unwrap();
        let queue = listings.entry(folder_id.to_string()).or_default();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    async fn send_message(
        &self,
        message: &OutgoingMessage,
    ) -> std::result::Result<(), ProviderError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn account_address(&self) -> std::result::Result<String, ProviderError> {
        Ok("fake@example.com".to_string())
    }

    async fn current_token(&self) -> Token {
        Token::bearer("fake")
    }
}

/// Hands out a fixed provider per address.
#[derive(Debug, Default)]
pub struct FakeFactory {
    providers: HashMap<String, Arc<FakeProvider>>,
}

impl FakeFactory {
    pub fn with(mut self, email: &str, provider: Arc<FakeProvider>) -> Self {
        self.providers.insert(email.to_string(), provider);
        self
    }
}

impl ProviderFactory for FakeFactory {
    fn create(&self, conn: &MailAccountConnection) -> Result<Arc<dyn MailProvider>> {
        let provider = self
            .providers
            .get(&conn.email_address)
            .ok_or_else(|| crate::Error::AccountNotFound(conn.email_address.clone()))?;
        Ok(Arc::clone(provider) as Arc<dyn MailProvider>)
    }
}
