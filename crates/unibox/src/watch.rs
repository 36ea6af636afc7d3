//! `unibox watch`: poll the inbox and raise desktop notifications.

use std::sync::Arc;

use async_trait::async_trait;
use notify_rust::{Notification, Timeout};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use unibox_core::{
    ChatEntry, ChatRole, ConversationLog, FolderError, HandoffClient, HandoffError, HandoffReply,
    NewMailEvent, Notice, PollHandler, Poller, WatchCommand,
};

use crate::app::App;

/// Prints poll results and shows them as desktop notifications.
struct DesktopHandler {
    log: Option<ConversationLog>,
}

#[async_trait]
impl PollHandler for DesktopHandler {
    async fn on_new_mail(&mut self, event: &NewMailEvent, notice: &Notice) {
        println!("{}: {}", notice.body, notice.title);
        for msg in &event.messages {
            println!("  {:<28.28}  {}", msg.from, msg.subject);
        }

        let summary = notice.title.clone();
        let body = match event.messages.first() {
            Some(latest) if event.delta == 1 => format!("{}\n{}", latest.from, latest.subject),
            _ => notice.body.clone(),
        };
        let timeout = Timeout::Milliseconds(
            u32::try_from(notice.dismiss_after.as_millis()).unwrap_or(u32::MAX),
        );
        let shown = tokio::task::spawn_blocking(move || {
            Notification::new()
                .appname("Unibox")
                .summary(&summary)
                .body(&body)
                .timeout(timeout)
                .show()
                .map(|_| ())
        })
        .await;
        match shown {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "desktop notification failed"),
            Err(e) => warn!(error = %e, "desktop notification task failed"),
        }
    }

    async fn on_poll_error(&mut self, error: &FolderError) {
        if error.requires_reconnect() {
            eprintln!("{error}. Reconnect the account with `unibox connect`.");
        } else {
            eprintln!("Inbox refresh failed: {error}");
        }
    }

    async fn on_handoff(&mut self, account: &str, result: Result<HandoffReply, HandoffError>) {
        let entry = match result {
            Ok(reply) => ChatEntry::new(ChatRole::Assistant, reply.response),
            Err(HandoffError::Disabled) => return,
            Err(e) => {
                warn!(account, error = %e, "hand-off for new mail failed");
                return;
            }
        };
        println!("assistant> {}", entry.text);
        if let Some(log) = &self.log
            && let Err(e) = log.append(account, Some(account), &entry).await
        {
            warn!(error = %e, "could not record hand-off reply");
        }
    }
}

/// Runs the poll loop until Ctrl-C.
///
/// Lines on stdin steer the loop: `poll` refreshes now and `select <email>`
/// switches account.
pub async fn run(app: &mut App) -> anyhow::Result<()> {
    let settings = &app.settings;
    let mut handler = DesktopHandler { log: None };
    let handoff = if settings.handoff.on_new_mail && settings.handoff.endpoint.is_some() {
        let client = HandoffClient::from_settings(settings)?;
        handler.log = Some(ConversationLog::new(app.repo.pool().clone()).await?);
        Some(client)
    } else {
        None
    };

    let mut poller =
        Poller::new(settings.poll_interval(), handler).with_notice_dismiss(settings.notice_dismiss());
    if let Some(client) = handoff {
        info!(endpoint = %client.endpoint(), "handing new mail to the assistant");
        poller = poller.with_handoff(Arc::new(client), settings.handoff.agent_id.clone());
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let (command_tx, command_rx) = mpsc::channel(8);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(());
        }
    });
    tokio::spawn(read_commands(command_tx));

    println!(
        "Watching {} every {}s. Type `poll` or `select <email>`; Ctrl-C stops.",
        app.inbox
            .active_connection()
            .map_or("inbox", |c| c.email_address.as_str()),
        settings.poll_interval_secs
    );
    poller.run(&mut app.inbox, command_rx, shutdown_rx).await;

    if poller.skipped() > 0 {
        debug!(skipped = poller.skipped(), "ticks skipped while a refresh was running");
    }
    if let Some(conn) = app.inbox.active_connection() {
        app.repo.set_active(Some(&conn.email_address)).await?;
    }
    Ok(())
}

async fn read_commands(commands: mpsc::Sender<WatchCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        let command = match line.split_once(' ') {
            _ if line == "poll" => WatchCommand::PollNow,
            Some(("select", email)) if !email.trim().is_empty() => {
                WatchCommand::SelectAccount(email.trim().to_string())
            }
            _ if line.is_empty() => continue,
            _ => {
                eprintln!("Unknown command `{line}`; use `poll` or `select <email>`");
                continue;
            }
        };
        if commands.send(command).await.is_err() {
            break;
        }
    }
}
