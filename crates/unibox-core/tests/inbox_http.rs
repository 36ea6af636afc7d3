//! Inbox and poller driving the real REST adapters against a scripted server.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{MockServer, Reply};
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use unibox_core::{
    ConnectionRepository, FolderKey, HandoffClient, HandoffError, HandoffReply,
    HttpProviderFactory, Inbox, LoadState, MailAccountConnection, NewMailEvent, Notice,
    PollHandler, Poller, ProviderKind, SelectionSource, Settings,
};
use unibox_oauth::{OAuthClient, Provider, Token};
use url::Url;

const GMAIL_LIST: &str = "/gmail/v1/users/me/messages";

fn gmail_message(id: &str, subject: &str) -> Value {
    json!({
        "id": id,
        "labelIds": ["INBOX", "UNREAD"],
        "internalDate": "1714555800000",
        "payload": {"headers": [
            {"name": "Subject", "value": subject},
            {"name": "From", "value": "Ann <ann@example.com>"}
        ]}
    })
}

fn script_gmail(server: &MockServer) {
    server
        .route(
            "GET",
            "/gmail/v1/users/me/labels",
            Reply::json(
                200,
                json!({"labels": [
                    {"id": "INBOX", "name": "INBOX", "type": "system"},
                    {"id": "SENT", "name": "SENT", "type": "system"}
                ]}),
            ),
        )
        .route(
            "GET",
            "/gmail/v1/users/me/messages/m1",
            Reply::json(200, gmail_message("m1", "Hello")),
        )
        .route(
            "GET",
            "/gmail/v1/users/me/messages/m2",
            Reply::json(200, gmail_message("m2", "Second")),
        );
}

fn script_graph(server: &MockServer) {
    server
        .route(
            "GET",
            "/v1.0/me/mailFolders",
            Reply::json(200, json!({"value": [{"id": "AAA", "displayName": "Inbox"}]})),
        )
        .route("GET", "/v1.0/me/mailFolders/inbox", Reply::json(200, json!({"id": "AAA"})))
        .route(
            "GET",
            "/v1.0/me/mailFolders/AAA/messages",
            Reply::json(
                200,
                json!({"value": [{
                    "id": "g1",
                    "subject": "From Outlook",
                    "from": {"emailAddress": {"address": "dana@contoso.com"}},
                    "receivedDateTime": "2024-05-01T09:30:00Z",
                    "isRead": false
                }]}),
            ),
        );
}

fn factory(server: &MockServer, settings: &mut Settings) -> HttpProviderFactory {
    settings.api.gmail_base = server.url("gmail/v1");
    settings.api.graph_base = server.url("v1.0");

    let provider = |name: &str| {
        Provider::new(name, server.url("auth"), server.url("token"))
            .unwrap()
            .with_default_scopes(&["mail"])
    };
    HttpProviderFactory::from_settings(settings)
        .unwrap()
        .with_oauth_client(ProviderKind::Gmail, OAuthClient::new("g", provider("Google")))
        .with_oauth_client(
            ProviderKind::Microsoft,
            OAuthClient::new("m", provider("Microsoft")),
        )
}

fn inbox(server: &MockServer, settings: &mut Settings) -> Inbox {
    let factory = factory(server, settings);
    let connections = vec![
        MailAccountConnection::new(ProviderKind::Gmail, "ann@gmail.com", Token::bearer("g-tok")),
        MailAccountConnection::new(
            ProviderKind::Microsoft,
            "dana@contoso.com",
            Token::bearer("m-tok"),
        ),
    ];
    Inbox::new(connections, Arc::new(factory), settings)
}

fn subjects(state: &LoadState<Vec<unibox_core::Message>, unibox_core::FolderError>) -> Vec<String> {
    state
        .loaded()
        .unwrap()
        .iter()
        .map(|m| m.subject.clone())
        .collect()
}

#[tokio::test]
async fn cache_and_account_switch_over_http() {
    let server = MockServer::start().await;
    script_gmail(&server);
    script_graph(&server);
    server.route(
        "GET",
        GMAIL_LIST,
        Reply::json(200, json!({"messages": [{"id": "m1"}]})),
    );
    let mut inbox = inbox(&server, &mut Settings::default());

    inbox
        .select_account("ann@gmail.com", SelectionSource::Manual)
        .await
        .unwrap();
    let shown = inbox.open_folder(FolderKey::Inbox, false).await.unwrap();
    assert_eq!(subjects(shown), vec!["Hello"]);
    assert_eq!(server.hits("GET", GMAIL_LIST), 1);
    assert_eq!(inbox.folder_map().folder_id(FolderKey::Sent), Some("SENT"));

    // Fresh cache: no second request.
    inbox.open_folder(FolderKey::Inbox, false).await.unwrap();
    assert_eq!(server.hits("GET", GMAIL_LIST), 1);

    inbox
        .select_account("dana@contoso.com", SelectionSource::Manual)
        .await
        .unwrap();
    let shown = inbox.open_folder(FolderKey::Inbox, false).await.unwrap();
    assert_eq!(subjects(shown), vec!["From Outlook"]);
    let graph_auth = server
        .requests()
        .into_iter()
        .find(|r| r.path == "/v1.0/me/mailFolders/AAA/messages")
        .unwrap()
        .authorization;
    assert_eq!(graph_auth.as_deref(), Some("Bearer m-tok"));

    // Switching back starts from an empty cache.
    inbox
        .select_account("ann@gmail.com", SelectionSource::Manual)
        .await
        .unwrap();
    inbox.open_folder(FolderKey::Inbox, false).await.unwrap();
    assert_eq!(server.hits("GET", GMAIL_LIST), 2);

    inbox.open_folder(FolderKey::Inbox, true).await.unwrap();
    assert_eq!(server.hits("GET", GMAIL_LIST), 3);
}

#[tokio::test]
async fn refreshed_token_can_be_stored_again() {
    let server = MockServer::start().await;
    script_gmail(&server);
    server
        .route(
            "GET",
            GMAIL_LIST,
            Reply::json(401, json!({"error": {"code": 401, "message": "Invalid Credentials"}})),
        )
        .route(
            "GET",
            GMAIL_LIST,
            Reply::json(200, json!({"messages": [{"id": "m1"}]})),
        )
        .route(
            "POST",
            "/token",
            Reply::json(200, json!({"access_token": "fresh", "token_type": "Bearer"})),
        );

    let repo = ConnectionRepository::in_memory().await.unwrap();
    let mut conn = MailAccountConnection::new(
        ProviderKind::Gmail,
        "ann@gmail.com",
        Token::bearer("stale").with_refresh_token("r-1"),
    );
    repo.save(&mut conn).await.unwrap();

    let mut settings = Settings::default();
    let factory = factory(&server, &mut settings);
    let mut inbox = Inbox::new(repo.list().await.unwrap(), Arc::new(factory), &settings);
    inbox
        .select_account("ann@gmail.com", SelectionSource::Manual)
        .await
        .unwrap();
    inbox.open_folder(FolderKey::Inbox, false).await.unwrap();

    inbox.sync_token().await;
    let active = inbox.active_connection().unwrap();
    assert_eq!(active.token.access_token, "fresh");
    repo.update_token(active.id.unwrap(), &active.token).unwrap();

    let stored = repo.find_by_email("ann@gmail.com").await.unwrap().unwrap();
    assert_eq!(stored.token.access_token, "fresh");
    assert_eq!(stored.token.refresh_token.as_deref(), Some("r-1"));
}

#[tokio::test]
async fn unavailable_folder_makes_no_request() {
    let server = MockServer::start().await;
    script_graph(&server);
    let mut inbox = inbox(&server, &mut Settings::default());
    inbox
        .select_account("dana@contoso.com", SelectionSource::Manual)
        .await
        .unwrap();
    inbox.load_folders().await.unwrap();
    let before = server.requests().len();

    let state = inbox.open_folder(FolderKey::Trash, false).await.unwrap();
    assert!(state.error().is_some());
    assert_eq!(server.requests().len(), before);
}

/// Stops the poll loop once the hand-off reply arrives.
struct StopOnHandoff {
    events: mpsc::UnboundedSender<NewMailEvent>,
    replies: Vec<String>,
    stop: broadcast::Sender<()>,
}

#[async_trait]
impl PollHandler for StopOnHandoff {
    async fn on_new_mail(&mut self, event: &NewMailEvent, _notice: &Notice) {
        self.events.send(event.clone()).unwrap();
    }

    async fn on_handoff(&mut self, _account: &str, result: Result<HandoffReply, HandoffError>) {
        self.replies.push(result.unwrap().response);
        let _ = self.stop.send(());
    }
}

#[tokio::test]
async fn new_mail_is_detected_and_handed_off_once() {
    let server = MockServer::start().await;
    script_gmail(&server);
    server
        .route(
            "GET",
            GMAIL_LIST,
            Reply::json(200, json!({"messages": [{"id": "m1"}]})),
        )
        .route(
            "GET",
            GMAIL_LIST,
            Reply::json(200, json!({"messages": [{"id": "m2"}, {"id": "m1"}]})),
        )
        .route(
            "POST",
            "/agent",
            Reply::json(200, json!({"response": "Ann sent a second note"})),
        );
    let mut inbox = inbox(&server, &mut Settings::default());
    inbox
        .select_account("ann@gmail.com", SelectionSource::Manual)
        .await
        .unwrap();

    let (stop, shutdown) = broadcast::channel(1);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let handler = StopOnHandoff {
        events: events_tx,
        replies: Vec::new(),
        stop,
    };
    let handoff = HandoffClient::new(
        Url::parse(&server.url("agent")).unwrap(),
        Duration::from_secs(5),
    );
    let mut poller = Poller::new(Duration::from_millis(100), handler)
        .with_handoff(Arc::new(handoff), Some("mail-helper".into()));
    let (_commands_tx, commands) = mpsc::channel(1);

    tokio::time::timeout(
        Duration::from_secs(10),
        poller.run(&mut inbox, commands, shutdown),
    )
    .await
    .unwrap();

    let event = events.try_recv().unwrap();
    assert_eq!(event.account, "ann@gmail.com");
    assert_eq!(event.delta, 1);
    assert_eq!(event.messages[0].subject, "Second");
    assert!(events.try_recv().is_err());

    assert_eq!(poller.handler().replies, vec!["Ann sent a second note"]);
    assert_eq!(server.hits("POST", "/agent"), 1);
    let request = server
        .requests()
        .into_iter()
        .find(|r| r.path == "/agent")
        .unwrap();
    let body: Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body["session_id"], "ann@gmail.com");
    assert_eq!(body["agent_id"], "mail-helper");
    assert!(body["message"].as_str().unwrap().contains("Subject: Second"));
}
