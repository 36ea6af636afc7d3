//! Connecting an account through the provider's consent page.

use std::time::Duration;

use anyhow::{Context, bail};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{info, warn};
use unibox_core::{MailAccountConnection, ProviderFactory, ProviderKind};
use unibox_oauth::{AuthorizationCodeFlow, PkceChallenge};
use url::Url;

use crate::app::App;

/// How long to wait for the browser to come back.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

const SUCCESS_PAGE: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n\
    <!DOCTYPE html><html><body style='font-family: sans-serif; padding: 40px; text-align: center;'>\
    <h1>Account connected</h1><p>You can close this window and return to Unibox.</p></body></html>";

const FAILURE_PAGE: &str = "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n\
    <!DOCTYPE html><html><body style='font-family: sans-serif; padding: 40px; text-align: center;'>\
    <h1>Connection failed</h1><p>Return to Unibox for details.</p></body></html>";

/// Runs the consent flow for `provider` and stores the new connection.
///
/// The stored connection is returned with its ID set; reconnecting an
/// address that is already stored replaces its token.
pub async fn authorize(app: &App, provider: ProviderKind) -> anyhow::Result<MailAccountConnection> {
    let Some(client) = app.factory.oauth_client(provider) else {
        bail!(
            "{} is not configured; set its client ID in the settings file",
            provider.display_name()
        );
    };

    let port = app.settings.oauth.redirect_port;
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("Cannot listen for the consent redirect on port {port}"))?;

    let flow = AuthorizationCodeFlow::new(client.clone()).with_pkce();
    let state = PkceChallenge::generate().verifier().to_string();
    let url = flow.authorization_url(Some(&state))?;

    println!("Opening the {} consent page in your browser.", provider.display_name());
    println!("If it does not open, visit:\n\n  {url}\n");
    if let Err(e) = opener::open(url.as_str()) {
        warn!(error = %e, "could not open browser");
    }

    let code = tokio::time::timeout(CALLBACK_TIMEOUT, receive_code(&listener, port, &state))
        .await
        .context("No answer from the consent page within 5 minutes")??;

    info!(provider = %provider, "exchanging authorization code");
    let token = flow.exchange_code(&code).await?;

    // The adapter tells us which mailbox the token belongs to.
    let probe = MailAccountConnection::new(provider, "", token);
    let adapter = app.factory.create(&probe)?;
    let address = adapter
        .account_address()
        .await
        .context("Could not read the account address")?;

    let mut conn = MailAccountConnection::new(provider, address, adapter.current_token().await);
    if let Some(existing) = app.repo.find_by_email(&conn.email_address).await? {
        info!(email = %conn.email_address, "replacing the token of a connected account");
        conn.id = existing.id;
        conn.display_name = existing.display_name;
    }
    app.repo.save(&mut conn).await?;
    Ok(conn)
}

/// Accepts the redirect and answers the browser.
async fn receive_code(listener: &TcpListener, port: u16, state: &str) -> anyhow::Result<String> {
    loop {
        let (mut socket, _) = listener.accept().await?;
        let mut reader = BufReader::new(&mut socket);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).await?;

        // Browsers also ask for /favicon.ico; only the callback counts.
        let Some(target) = request_line.split_whitespace().nth(1) else {
            continue;
        };
        if !target.starts_with("/callback") {
            socket
                .write_all(b"HTTP/1.1 404 Not Found\r\nConnection: close\r\n\r\n")
                .await?;
            continue;
        }

        let redirect = Url::parse(&format!("http://127.0.0.1:{port}{target}"))?;
        return match AuthorizationCodeFlow::code_from_redirect(&redirect, Some(state)) {
            Ok(code) => {
                socket.write_all(SUCCESS_PAGE.as_bytes()).await?;
                Ok(code)
            }
            Err(e) => {
                socket.write_all(FAILURE_PAGE.as_bytes()).await?;
                Err(e.into())
            }
        };
    }
}
