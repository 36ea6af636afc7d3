//! Unibox - one inbox for several Gmail and Outlook accounts.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod app;
mod connect;
mod watch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use unibox_core::{FolderKey, ProviderKind};

use app::App;

#[derive(Parser)]
#[command(name = "unibox", version, about = "Unified inbox for Gmail and Outlook")]
struct Cli {
    /// Settings file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Account to use for this run, without changing the saved selection.
    #[arg(long, short, global = true, env = "UNIBOX_ACCOUNT")]
    account: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List connected accounts.
    Accounts,

    /// Connect a new account through the provider's consent page.
    Connect {
        /// gmail or microsoft.
        provider: ProviderKind,
    },

    /// Remove a connected account and its stored token.
    Disconnect {
        /// Account address.
        email: String,
    },

    /// Make an account the active one.
    Select {
        /// Account address.
        email: String,
    },

    /// List the active account's folders.
    Folders,

    /// List messages in a folder.
    List {
        /// inbox, sent, drafts, archive, spam or trash.
        #[arg(default_value = "inbox")]
        folder: FolderKey,

        /// Ignore the cache and fetch from the server.
        #[arg(long)]
        refresh: bool,
    },

    /// Send a new message.
    Send {
        /// Recipients, comma separated.
        #[arg(long)]
        to: String,
        /// CC recipients, comma separated.
        #[arg(long, default_value = "")]
        cc: String,
        /// BCC recipients, comma separated.
        #[arg(long, default_value = "")]
        bcc: String,
        /// Subject line.
        #[arg(long)]
        subject: String,
        /// Message body.
        #[arg(long)]
        body: String,
    },

    /// Reply to a message.
    Reply {
        /// Message ID as shown by `list`.
        id: String,
        /// Reply text, placed above the quote.
        #[arg(long)]
        body: String,
        /// Folder holding the message.
        #[arg(long, default_value = "inbox")]
        folder: FolderKey,
    },

    /// Forward a message.
    Forward {
        /// Message ID as shown by `list`.
        id: String,
        /// Recipients, comma separated.
        #[arg(long)]
        to: String,
        /// Note placed above the forwarded message.
        #[arg(long, default_value = "")]
        body: String,
        /// Folder holding the message.
        #[arg(long, default_value = "inbox")]
        folder: FolderKey,
    },

    /// Watch the inbox for new mail until interrupted.
    Watch,

    /// Talk to the AI assistant. Without text, starts an interactive chat.
    Chat {
        /// Message to send.
        text: Option<String>,
        /// Conversation to continue.
        #[arg(long, default_value = "cli")]
        session: String,
    },

    /// Add a knowledge document for the AI assistant.
    Upload {
        /// File to upload (pdf, doc, docx or txt).
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unibox=info,unibox_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!("Starting Unibox");

    let mut app = App::open(cli.config.as_deref(), cli.account.as_deref()).await?;

    match cli.command {
        Commands::Accounts => app.accounts(),
        Commands::Connect { provider } => app.connect(provider).await?,
        Commands::Disconnect { email } => app.disconnect(&email).await?,
        Commands::Select { email } => app.select(&email).await?,
        Commands::Folders => app.folders().await?,
        Commands::List { folder, refresh } => app.list(folder, refresh).await?,
        Commands::Send {
            to,
            cc,
            bcc,
            subject,
            body,
        } => app.send(to, cc, bcc, subject, body).await?,
        Commands::Reply { id, body, folder } => app.reply(&id, &body, folder).await?,
        Commands::Forward {
            id,
            to,
            body,
            folder,
        } => app.forward(&id, to, &body, folder).await?,
        Commands::Watch => app.watch().await?,
        Commands::Chat { text, session } => app.chat(text, session).await?,
        Commands::Upload { path } => app.upload(&path).await?,
    }

    app.persist_tokens().await?;
    Ok(())
}
