//! Knowledge documents for the AI hand-off.
//!
//! Uploads are checked against an [`UploadPolicy`], copied into the data
//! directory and recorded in the `knowledge_documents` table.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use tracing::info;

use crate::Result;

const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Why an upload was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    /// The file is empty.
    #[error("File is empty")]
    Empty,

    /// The file exceeds the size limit.
    #[error("File is {size} bytes; the limit is {max} bytes")]
    TooLarge {
        /// File size.
        size: u64,
        /// Configured limit.
        max: u64,
    },

    /// The extension is not on the allow list.
    #[error("File type .{0} is not allowed")]
    UnsupportedType(String),

    /// The file name has no extension.
    #[error("File has no extension")]
    MissingExtension,
}

/// Size and type limits for uploads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadPolicy {
    /// Largest accepted file, in bytes.
    pub max_bytes: u64,
    /// Accepted extensions, lowercase, without the dot.
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: MAX_UPLOAD_BYTES,
            allowed_extensions: ["pdf", "doc", "docx", "txt"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl UploadPolicy {
    /// Checks a file name and size, returning the normalized extension.
    ///
    /// # Errors
    ///
    /// Returns an [`UploadError`] describing the first rule the file breaks.
    pub fn validate(&self, file_name: &str, size: u64) -> std::result::Result<String, UploadError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or(UploadError::MissingExtension)?;

        if !self.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(&extension)) {
            return Err(UploadError::UnsupportedType(extension));
        }
        if size == 0 {
            return Err(UploadError::Empty);
        }
        if size > self.max_bytes {
            return Err(UploadError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }
        Ok(extension)
    }
}

/// Media type for an accepted extension.
#[must_use]
pub fn media_type(extension: &str) -> &'static str {
    match extension {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// An uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    /// Row ID (None if not yet saved).
    pub id: Option<i64>,
    /// Original file name.
    pub file_name: String,
    /// Media type derived from the extension.
    pub media_type: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Where the stored copy lives.
    pub stored_path: PathBuf,
    /// Upload time.
    pub uploaded_at: DateTime<Utc>,
}

/// Repository for uploaded knowledge documents.
#[derive(Debug, Clone)]
pub struct KnowledgeRepository {
    pool: SqlitePool,
    policy: UploadPolicy,
}

impl KnowledgeRepository {
    /// Opens the repository on an existing pool, creating the table if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub async fn new(pool: SqlitePool, policy: UploadPolicy) -> Result<Self> {
        let repo = Self { pool, policy };
        repo.initialize().await?;
        Ok(repo)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS knowledge_documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_name TEXT NOT NULL,
                media_type TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                stored_path TEXT NOT NULL,
                uploaded_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Active upload policy.
    #[must_use]
    pub const fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Validates `source`, copies it into `store_dir` and records it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upload`](crate::Error::Upload) if the file breaks the
    /// policy, or an I/O or database error.
    pub async fn upload(&self, source: &Path, store_dir: &Path) -> Result<KnowledgeDocument> {
        let file_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(UploadError::MissingExtension)?
            .to_string();
        let size = tokio::fs::metadata(source).await?.len();
        let extension = self.policy.validate(&file_name, size)?;

        let uploaded_at = Utc::now();
        tokio::fs::create_dir_all(store_dir).await?;
        let stored_path = store_dir.join(format!(
            "{}-{file_name}",
            uploaded_at.format("%Y%m%d%H%M%S%3f")
        ));
        tokio::fs::copy(source, &stored_path).await?;

        let mut doc = KnowledgeDocument {
            id: None,
            file_name,
            media_type: media_type(&extension).to_string(),
            size_bytes: size,
            stored_path,
            uploaded_at,
        };
        self.save(&mut doc).await?;
        info!(file = %doc.file_name, size = doc.size_bytes, "knowledge document uploaded");
        Ok(doc)
    }

    async fn save(&self, doc: &mut KnowledgeDocument) -> Result<()> {
        let result = sqlx::query(
            r"
            INSERT INTO knowledge_documents
                (file_name, media_type, size_bytes, stored_path, uploaded_at)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(&doc.file_name)
        .bind(&doc.media_type)
        .bind(i64::try_from(doc.size_bytes).unwrap_or(i64::MAX))
        .bind(doc.stored_path.to_string_lossy().into_owned())
        .bind(doc.uploaded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        doc.id = Some(result.last_insert_rowid());
        Ok(())
    }

    /// All documents, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list(&self) -> Result<Vec<KnowledgeDocument>> {
        let rows = sqlx::query(
            r"
            SELECT id, file_name, media_type, size_bytes, stored_path, uploaded_at
            FROM knowledge_documents
            ORDER BY id DESC
            ",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    /// Removes a document record and its stored copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let path: Option<String> =
            sqlx::query_scalar("SELECT stored_path FROM knowledge_documents WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        sqlx::query("DELETE FROM knowledge_documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if let Some(path) = path
            && let Err(e) = tokio::fs::remove_file(&path).await
        {
            tracing::warn!(%path, error = %e, "failed to remove stored document");
        }
        Ok(())
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> KnowledgeDocument {
    let size: i64 = row.get("size_bytes");
    let stored_path: String = row.get("stored_path");
    let uploaded_at: String = row.get("uploaded_at");
    KnowledgeDocument {
        id: Some(row.get("id")),
        file_name: row.get("file_name"),
        media_type: row.get("media_type"),
        size_bytes: u64::try_from(size).unwrap_or_default(),
        stored_path: PathBuf::from(stored_path),
        uploaded_at: DateTime::parse_from_rfc3339(&uploaded_at)
            .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc)),
    }
}
