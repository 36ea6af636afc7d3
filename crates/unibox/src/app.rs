//! Command implementations over the core inbox.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};
use unibox_core::config::{data_dir, database_path};
use unibox_core::credentials::KeyringVault;
use unibox_core::{
    ChatEntry, ChatRole, ChatSession, ChatState, ComposeDraft, ConnectionId, ConnectionRepository,
    ConversationLog, FolderKey, HandoffClient, HttpProviderFactory, Inbox, KnowledgeRepository,
    LoadState, Message, ProviderKind, SelectionSource, Settings,
};
use unibox_oauth::Token;

/// Everything a command needs: settings, storage and the inbox.
pub struct App {
    pub settings: Settings,
    pub repo: ConnectionRepository,
    pub factory: Arc<HttpProviderFactory>,
    pub inbox: Inbox,
    /// Tokens as last written to the vault.
    stored_tokens: HashMap<ConnectionId, Token>,
}

impl App {
    /// Loads settings and connections and restores the active account.
    ///
    /// The saved selection is applied as a restored choice and `account_hint`
    /// on top of it as a hint, so the hint wins for this run only.
    pub async fn open(config: Option<&Path>, account_hint: Option<&str>) -> anyhow::Result<Self> {
        let settings = match config {
            Some(path) => {
                let mut settings = Settings::load_from(path)
                    .await
                    .with_context(|| format!("Failed to load settings from {}", path.display()))?;
                settings.apply_env(|key| std::env::var(key).ok());
                settings
            }
            None => Settings::load().await.context("Failed to load settings")?,
        };

        tokio::fs::create_dir_all(data_dir()).await?;
        let db = database_path();
        let repo = ConnectionRepository::new(&db.to_string_lossy())
            .await
            .with_context(|| format!("Failed to open database {}", db.display()))?;

        let factory =
            Arc::new(HttpProviderFactory::from_settings(&settings)?.with_vault(Arc::new(KeyringVault)));
        let connections = repo.list().await?;
        let stored_tokens = connections
            .iter()
            .filter_map(|c| Some((c.id?, c.token.clone())))
            .collect();
        let mut inbox = Inbox::new(connections, factory.clone(), &settings);

        if let Some(saved) = repo.active_email().await?
            && let Err(e) = inbox.select_account(&saved, SelectionSource::Restored).await
        {
            warn!(email = %saved, error = %e, "could not restore saved account");
        }
        if let Some(hint) = account_hint {
            inbox
                .select_account(hint, SelectionSource::Hint)
                .await
                .with_context(|| format!("Cannot use account {hint}"))?;
        }

        Ok(Self {
            settings,
            repo,
            factory,
            inbox,
            stored_tokens,
        })
    }

    /// Writes tokens refreshed during this run back to the vault.
    pub async fn persist_tokens(&mut self) -> anyhow::Result<()> {
        self.inbox.sync_token().await;
        for conn in self.inbox.connections() {
            let Some(id) = conn.id else { continue };
            if self.stored_tokens.get(&id) == Some(&conn.token) {
                continue;
            }
            self.repo
                .update_token(id, &conn.token)
                .with_context(|| format!("Failed to store the token for {}", conn.email_address))?;
            self.stored_tokens.insert(id, conn.token.clone());
            debug!(email = %conn.email_address, "stored refreshed token");
        }
        Ok(())
    }

    fn active_email(&self) -> anyhow::Result<String> {
        match self.inbox.active_connection() {
            Some(conn) => Ok(conn.email_address.clone()),
            None if self.inbox.connections().is_empty() => {
                bail!("No accounts connected; run `unibox connect gmail` or `unibox connect microsoft`")
            }
            None => bail!("No active account; run `unibox select <email>`"),
        }
    }

    pub fn accounts(&self) {
        let active = self.inbox.active_connection().map(|c| c.email_address.as_str());
        if self.inbox.connections().is_empty() {
            println!("No accounts connected.");
            return;
        }
        for conn in self.inbox.connections() {
            let marker = if Some(conn.email_address.as_str()) == active {
                "*"
            } else {
                " "
            };
            println!(
                "{marker} {:<40} {}",
                conn.label(),
                conn.provider.display_name()
            );
        }
    }

    pub async fn connect(&mut self, provider: ProviderKind) -> anyhow::Result<()> {
        let conn = crate::connect::authorize(self, provider).await?;
        println!("Connected {} ({})", conn.email_address, provider.display_name());

        let first = self.inbox.active_connection().is_none();
        let email = conn.email_address.clone();
        if let Some(id) = conn.id {
            self.stored_tokens.insert(id, conn.token.clone());
        }
        self.inbox.add_connection(conn);
        if first {
            self.select(&email).await?;
        }
        Ok(())
    }

    pub async fn disconnect(&mut self, email: &str) -> anyhow::Result<()> {
        let was_active = self
            .inbox
            .active_connection()
            .is_some_and(|c| c.matches(email));
        let removed = self.inbox.disconnect(email)?;
        if let Some(id) = removed.id {
            self.repo.delete(id).await?;
        }
        if was_active {
            self.repo.set_active(None).await?;
        }
        println!("Disconnected {}", removed.email_address);
        Ok(())
    }

    pub async fn select(&mut self, email: &str) -> anyhow::Result<()> {
        self.inbox
            .select_account(email, SelectionSource::Manual)
            .await?;
        let email = self.active_email()?;
        self.repo.set_active(Some(&email)).await?;
        println!("Active account: {email}");
        Ok(())
    }

    pub async fn folders(&mut self) -> anyhow::Result<()> {
        self.active_email()?;
        let folders = match self.inbox.load_folders().await? {
            LoadState::Loaded(folders) => folders.clone(),
            LoadState::Failed(e) => bail!("Could not list folders: {e}"),
            LoadState::Idle | LoadState::Loading => return Ok(()),
        };
        for folder in &folders {
            let key = folder
                .well_known
                .map_or_else(String::new, |k| format!("[{k}]"));
            let unread = folder
                .unread_count
                .map_or_else(String::new, |n| format!("{n} unread"));
            println!("{:<32} {key:<10} {unread}", folder.name);
        }
        for key in FolderKey::ALL {
            if let Some(how) = self.inbox.folder_map().resolution(key) {
                debug!(folder = %key, ?how, "folder resolution");
            }
        }
        Ok(())
    }

    async fn listing(&mut self, folder: FolderKey, refresh: bool) -> anyhow::Result<Vec<Message>> {
        self.active_email()?;
        match self.inbox.open_folder(folder, refresh).await? {
            LoadState::Loaded(messages) => Ok(messages.clone()),
            LoadState::Failed(e) if e.requires_reconnect() => {
                bail!("{e}\nReconnect the account with `unibox connect`")
            }
            LoadState::Failed(e) => bail!("Could not load {folder}: {e}"),
            LoadState::Idle | LoadState::Loading => Ok(Vec::new()),
        }
    }

    pub async fn list(&mut self, folder: FolderKey, refresh: bool) -> anyhow::Result<()> {
        let messages = self.listing(folder, refresh).await?;
        if messages.is_empty() {
            println!("No messages in {folder}.");
        }
        for msg in &messages {
            let flags = format!(
                "{}{}",
                if msg.is_read { ' ' } else { '•' },
                if msg.is_starred { '★' } else { ' ' }
            );
            println!(
                "{flags} {}  {:<28.28}  {}\n     id: {}",
                msg.received_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
                msg.from,
                msg.subject,
                msg.id
            );
        }
        Ok(())
    }

    async fn find(&mut self, id: &str, folder: FolderKey) -> anyhow::Result<Message> {
        self.listing(folder, false)
            .await?
            .into_iter()
            .find(|m| m.id == id)
            .with_context(|| format!("No message {id} in {folder}"))
    }

    pub async fn send(
        &mut self,
        to: String,
        cc: String,
        bcc: String,
        subject: String,
        body: String,
    ) -> anyhow::Result<()> {
        let draft = ComposeDraft {
            to,
            cc,
            bcc,
            subject,
            body,
            ..ComposeDraft::new()
        };
        self.deliver(draft).await
    }

    pub async fn reply(&mut self, id: &str, body: &str, folder: FolderKey) -> anyhow::Result<()> {
        let original = self.find(id, folder).await?;
        let mut draft = ComposeDraft::reply(&original);
        draft.body = format!("{body}{}", draft.body);
        self.deliver(draft).await
    }

    pub async fn forward(
        &mut self,
        id: &str,
        to: String,
        body: &str,
        folder: FolderKey,
    ) -> anyhow::Result<()> {
        let original = self.find(id, folder).await?;
        let mut draft = ComposeDraft::forward(&original);
        draft.to = to;
        draft.body = format!("{body}{}", draft.body);
        self.deliver(draft).await
    }

    async fn deliver(&mut self, draft: ComposeDraft) -> anyhow::Result<()> {
        self.active_email()?;
        match self.inbox.send(draft).await {
            Ok(()) => {
                println!("Sent.");
                Ok(())
            }
            Err(unibox_core::Error::Compose(e)) => {
                for issue in e.issues() {
                    eprintln!("  {}: {}", issue.field().as_str(), issue.message());
                }
                bail!("Message not sent")
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn watch(&mut self) -> anyhow::Result<()> {
        self.active_email()?;
        crate::watch::run(self).await
    }

    pub async fn chat(&mut self, text: Option<String>, session: String) -> anyhow::Result<()> {
        let client = HandoffClient::from_settings(&self.settings)
            .context("Set `handoff.endpoint` in the settings file to use chat")?;
        let account = self.inbox.active_connection().map(|c| c.email_address.clone());
        let log = ConversationLog::new(self.repo.pool().clone()).await?;

        let mut chat = ChatSession::new(Arc::new(client), session);
        if let Some(agent) = &self.settings.handoff.agent_id {
            chat = chat.with_agent_id(agent);
        }
        if let Some(account) = &account {
            chat = chat.with_user_id(account);
        }

        if let Some(text) = text {
            return exchange(&mut chat, &log, account.as_deref(), &text).await;
        }

        for entry in log.history(chat.session_id()).await? {
            print_entry(&entry);
        }
        println!("Type a message. /reset clears a usage limit pause, /quit exits.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            match line.trim() {
                "" => {}
                "/quit" => break,
                "/reset" => {
                    chat.reset();
                    println!("Chat resumed.");
                }
                text => {
                    if let Err(e) = exchange(&mut chat, &log, account.as_deref(), text).await {
                        eprintln!("{e}");
                    }
                }
            }
        }
        Ok(())
    }

    pub async fn upload(&self, path: &Path) -> anyhow::Result<()> {
        let repo =
            KnowledgeRepository::new(self.repo.pool().clone(), self.settings.uploads.clone())
                .await?;
        let doc = repo
            .upload(path, &data_dir().join("knowledge"))
            .await
            .with_context(|| format!("Upload of {} rejected", path.display()))?;
        println!(
            "Uploaded {} ({}, {} bytes)",
            doc.file_name, doc.media_type, doc.size_bytes
        );
        Ok(())
    }
}

async fn exchange(
    chat: &mut ChatSession,
    log: &ConversationLog,
    account: Option<&str>,
    text: &str,
) -> anyhow::Result<()> {
    if chat.state() == ChatState::RateLimited {
        bail!("Chat is paused after hitting the usage limit; type /reset to resume");
    }
    let session = chat.session_id().to_string();
    log.append(&session, account, &ChatEntry::new(ChatRole::User, text))
        .await?;
    let entry = chat.submit(text).await?.clone();
    log.append(&session, account, &entry).await?;
    print_entry(&entry);
    Ok(())
}

fn print_entry(entry: &ChatEntry) {
    let who = match entry.role {
        ChatRole::User => "you",
        ChatRole::Assistant => "assistant",
        ChatRole::System => "--",
    };
    println!("{who}> {}", entry.text);
}
