//! Conversation log storage.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use tracing::warn;

use super::chat::{ChatEntry, ChatRole};
use crate::Result;

/// Stored hand-off exchanges.
///
/// Shares the connection database; see [`ConnectionRepository::pool`].
///
/// [`ConnectionRepository::pool`]: crate::ConnectionRepository::pool
#[derive(Debug, Clone)]
pub struct ConversationLog {
    pool: SqlitePool,
}

impl ConversationLog {
    /// Opens the log on an existing pool, creating the table if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let log = Self { pool };
        log.initialize().await?;
        Ok(log)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS conversation_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                account_email TEXT,
                role TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversation_session ON conversation_log(session_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Appends one transcript entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn append(
        &self,
        session_id: &str,
        account_email: Option<&str>,
        entry: &ChatEntry,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO conversation_log (session_id, account_email, role, text, created_at)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(session_id)
        .bind(account_email)
        .bind(entry.role.as_str())
        .bind(&entry.text)
        .bind(entry.at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Entries of a session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn history(&self, session_id: &str) -> Result<Vec<ChatEntry>> {
        let rows = sqlx::query(
            r"
            SELECT role, text, created_at
            FROM conversation_log
            WHERE session_id = ?
            ORDER BY id ASC
            ",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(row_to_entry).collect())
    }

    /// Deletes a session's entries and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn clear(&self, session_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM conversation_log WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Option<ChatEntry> {
    let role: String = row.get("role");
    let created_at: String = row.get("created_at");

    let role = match role.parse::<ChatRole>() {
        Ok(role) => role,
        Err(e) => {
            warn!(error = %e, "skipping conversation entry");
            return None;
        }
    };
    let at = DateTime::parse_from_rfc3339(&created_at)
        .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));

    Some(ChatEntry {
        role,
        text: row.get("text"),
        at,
    })
}
