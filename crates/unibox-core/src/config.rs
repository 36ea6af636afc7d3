//! Runtime configuration.
//!
//! Settings are persisted as JSON in the platform config directory
//! (`~/.config/unibox/settings.json` on Linux). A missing file means
//! defaults. OAuth client IDs may also come from the environment so they
//! never have to be written to disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::knowledge::UploadPolicy;
use crate::service::gmail::GMAIL_API_BASE;
use crate::service::graph::GRAPH_API_BASE;
use crate::{Error, Result};

const APP_DIR: &str = "unibox";
const SETTINGS_FILE: &str = "settings.json";
const DATABASE_FILE: &str = "unibox.db";

/// Environment variable overriding the Google OAuth client ID.
pub const GOOGLE_CLIENT_ID_ENV: &str = "UNIBOX_GOOGLE_CLIENT_ID";
/// Environment variable overriding the Google OAuth client secret.
pub const GOOGLE_CLIENT_SECRET_ENV: &str = "UNIBOX_GOOGLE_CLIENT_SECRET";
/// Environment variable overriding the Microsoft OAuth client ID.
pub const MICROSOFT_CLIENT_ID_ENV: &str = "UNIBOX_MICROSOFT_CLIENT_ID";

/// Application settings that persist across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Seconds between inbox polls.
    pub poll_interval_secs: u64,
    /// Seconds a cached folder listing stays fresh.
    pub cache_ttl_secs: u64,
    /// Messages requested per folder listing.
    pub page_size: usize,
    /// Seconds before a new-mail notice dismisses itself.
    pub notice_dismiss_secs: u64,
    /// OAuth application registration.
    pub oauth: OAuthSettings,
    /// Mail API roots.
    pub api: ApiSettings,
    /// AI hand-off endpoint.
    pub handoff: HandoffSettings,
    /// Knowledge document upload limits.
    pub uploads: UploadPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            cache_ttl_secs: 600,
            page_size: 50,
            notice_dismiss_secs: 5,
            oauth: OAuthSettings::default(),
            api: ApiSettings::default(),
            handoff: HandoffSettings::default(),
            uploads: UploadPolicy::default(),
        }
    }
}

/// OAuth client registration for each provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    /// Google OAuth client ID.
    pub google_client_id: Option<String>,
    /// Google OAuth client secret (desktop clients still get one).
    pub google_client_secret: Option<String>,
    /// Microsoft (Entra ID) application ID.
    pub microsoft_client_id: Option<String>,
    /// Loopback port the consent redirect comes back to.
    pub redirect_port: u16,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            google_client_id: None,
            google_client_secret: None,
            microsoft_client_id: None,
            redirect_port: 8765,
        }
    }
}

impl OAuthSettings {
    /// Loopback redirect URI registered with both providers.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/callback", self.redirect_port)
    }
}

/// Mail API base URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Gmail REST API root.
    pub gmail_base: String,
    /// Microsoft Graph root.
    pub graph_base: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            gmail_base: GMAIL_API_BASE.to_string(),
            graph_base: GRAPH_API_BASE.to_string(),
        }
    }
}

/// Where and how message content is handed to the AI endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffSettings {
    /// Endpoint URL; hand-off is disabled while unset.
    pub endpoint: Option<String>,
    /// Seconds to wait for a reply.
    pub timeout_secs: u64,
    /// Agent identifier sent with every request.
    pub agent_id: Option<String>,
    /// Hand new inbox mail to the endpoint while watching.
    pub on_new_mail: bool,
}

impl Default for HandoffSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 30,
            agent_id: None,
            on_new_mail: true,
        }
    }
}

impl Settings {
    /// Poll period.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Folder cache time-to-live.
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// New-mail notice lifetime.
    #[must_use]
    pub const fn notice_dismiss(&self) -> Duration {
        Duration::from_secs(self.notice_dismiss_secs)
    }

    /// Hand-off request timeout.
    #[must_use]
    pub const fn handoff_timeout(&self) -> Duration {
        Duration::from_secs(self.handoff.timeout_secs)
    }

    /// Load settings from the default location, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load() -> Result<Self> {
        let mut settings = Self::load_from(&settings_path()).await?;
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Load settings from `path`; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }

        let contents = tokio::fs::read_to_string(path).await?;
        let settings: Self = serde_json::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub async fn save(&self) -> Result<()> {
        self.save_to(&settings_path()).await
    }

    /// Save settings to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;
        info!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Overrides OAuth client credentials from the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(id) = non_empty(GOOGLE_CLIENT_ID_ENV) {
            self.oauth.google_client_id = Some(id);
        }
        if let Some(secret) = non_empty(GOOGLE_CLIENT_SECRET_ENV) {
            self.oauth.google_client_secret = Some(secret);
        }
        if let Some(id) = non_empty(MICROSOFT_CLIENT_ID_ENV) {
            self.oauth.microsoft_client_id = Some(id);
        }
    }

    /// Checks values that would otherwise fail much later.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first bad value.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(Error::Config("poll_interval_secs must be positive".into()));
        }
        if self.page_size == 0 || self.page_size > 500 {
            return Err(Error::Config("page_size must be 1-500".into()));
        }
        if self.handoff.timeout_secs == 0 {
            return Err(Error::Config("handoff.timeout_secs must be positive".into()));
        }
        for (name, value) in [
            ("api.gmail_base", Some(&self.api.gmail_base)),
            ("api.graph_base", Some(&self.api.graph_base)),
            ("handoff.endpoint", self.handoff.endpoint.as_ref()),
        ] {
            if let Some(value) = value {
                Url::parse(value).map_err(|e| Error::Config(format!("{name}: {e}")))?;
            }
        }
        Ok(())
    }
}

/// Directory holding `settings.json`.
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Path of the settings file.
#[must_use]
pub fn settings_path() -> PathBuf {
    config_dir().join(SETTINGS_FILE)
}

/// Directory holding the database.
#[must_use]
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Path of the `SQLite` database.
#[must_use]
pub fn database_path() -> PathBuf {
    data_dir().join(DATABASE_FILE)
}
