//! Connection storage repository.

use std::sync::Arc;

use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, warn};
use unibox_oauth::Token;

use super::credentials::{KeyringVault, MemoryVault, TokenVault};
use super::model::{ConnectionId, MailAccountConnection, ProviderKind};
use crate::Result;

/// Repository for connected accounts.
///
/// Connection metadata lives in `SQLite`; tokens go to a [`TokenVault`].
#[derive(Debug, Clone)]
pub struct ConnectionRepository {
    pool: SqlitePool,
    vault: Arc<dyn TokenVault>,
}

impl ConnectionRepository {
    /// Create a new repository with the given database path.
    ///
    /// Creates the database and tables if they don't exist. Tokens are kept in
    /// the system keyring.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let repo = Self {
            pool,
            vault: Arc::new(KeyringVault),
        };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing, with tokens held in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self {
            pool,
            vault: Arc::new(MemoryVault::default()),
        };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Replace the token vault.
    #[must_use]
    pub fn with_vault(mut self, vault: Arc<dyn TokenVault>) -> Self {
        self.vault = vault;
        self
    }

    /// Shared pool, for sibling repositories that live in the same database.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS connections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                provider TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                display_name TEXT,
                is_active INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get all connections that still have a stored token.
    ///
    /// Rows whose token is gone (for example, cleared from the keyring by
    /// hand) are skipped with a warning; reconnecting restores them.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<MailAccountConnection>> {
        let rows = sqlx::query(
            r"
            SELECT id, provider, email, display_name
            FROM connections
            ORDER BY email ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut connections = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(conn) = self.row_to_connection(row) {
                connections.push(conn);
            }
        }
        Ok(connections)
    }

    /// Get the connection for an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<MailAccountConnection>> {
        let row = sqlx::query(
            r"
            SELECT id, provider, email, display_name
            FROM connections
            WHERE email = ?
            ",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().and_then(|row| self.row_to_connection(row)))
    }

    /// Address of the connection marked active, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn active_email(&self) -> Result<Option<String>> {
        let row = sqlx::query("SELECT email FROM connections WHERE is_active = 1 LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get("email")))
    }

    /// Save a connection (insert or update).
    ///
    /// Reconnecting an address that is already stored updates that row, so an
    /// address never appears twice. The token goes to the vault.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query or token storage fails.
    pub async fn save(&self, conn: &mut MailAccountConnection) -> Result<()> {
        if conn.id.is_none() {
            let existing = sqlx::query("SELECT id FROM connections WHERE email = ?")
                .bind(conn.email_address.trim())
                .fetch_optional(&self.pool)
                .await?;
            conn.id = existing.map(|row| ConnectionId::new(row.get("id")));
        }

        let id = if let Some(id) = conn.id {
            sqlx::query(
                r"
                UPDATE connections SET
                    provider = ?, email = ?, display_name = ?,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                ",
            )
            .bind(conn.provider.as_str())
            .bind(conn.email_address.trim())
            .bind(&conn.display_name)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
            id
        } else {
            let result = sqlx::query(
                r"
                INSERT INTO connections (provider, email, display_name)
                VALUES (?, ?, ?)
                ",
            )
            .bind(conn.provider.as_str())
            .bind(conn.email_address.trim())
            .bind(&conn.display_name)
            .execute(&self.pool)
            .await?;
            let id = ConnectionId::new(result.last_insert_rowid());
            conn.id = Some(id);
            id
        };

        self.vault.store(id, &conn.token)?;
        debug!(connection = %id, provider = %conn.provider, "saved connection");
        Ok(())
    }

    /// Replace the stored token after a refresh.
    ///
    /// # Errors
    ///
    /// Returns an error if token storage fails.
    pub fn update_token(&self, id: ConnectionId, token: &Token) -> Result<()> {
        self.vault.store(id, token)?;
        Ok(())
    }

    /// Mark one connection active and every other inactive; `None` clears it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn set_active(&self, email: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE connections SET is_active = COALESCE(email = ?, 0)")
            .bind(email.map(str::trim))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a connection and its token.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete(&self, id: ConnectionId) -> Result<()> {
        sqlx::query("DELETE FROM connections WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if let Err(e) = self.vault.delete(id) {
            warn!("Failed to delete token for connection {id}: {e}");
        }

        Ok(())
    }

    fn row_to_connection(&self, row: &sqlx::sqlite::SqliteRow) -> Option<MailAccountConnection> {
        let id = ConnectionId::new(row.get("id"));
        let email: String = row.get("email");

        let provider = match row.get::<String, _>("provider").parse::<ProviderKind>() {
            Ok(provider) => provider,
            Err(e) => {
                warn!(connection = %id, "skipping stored connection: {e}");
                return None;
            }
        };

        let token = match self.vault.load(id) {
            Ok(Some(token)) => token,
            Ok(None) => {
                warn!(connection = %id, %email, "no stored token, reconnect required");
                return None;
            }
            Err(e) => {
                warn!(connection = %id, "failed to load token: {e}");
                return None;
            }
        };

        Some(MailAccountConnection {
            id: Some(id),
            provider,
            email_address: email,
            display_name: row.get("display_name"),
            token,
        })
    }
}
