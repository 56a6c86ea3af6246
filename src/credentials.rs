//! Linked Google account credentials and their on-disk location.

use crate::config::Config;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleCredentials {
    pub refresh_token: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl GoogleCredentials {
    pub fn new(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
            access_token: None,
            expires_at: None,
        }
    }

    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }
}

/// A Google account linked through the OAuth flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedAccount {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub credentials: GoogleCredentials,
}

pub fn default_credentials_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gmail-assistant").join("credentials.json"))
}

pub fn save_account(path: &Path, account: &LinkedAccount) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(account)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(path, json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    info!("Saved credentials for {} to {}", account.email, path.display());
    Ok(())
}

/// Returns `Ok(None)` when no account has been linked yet.
pub fn load_account(path: &Path) -> io::Result<Option<LinkedAccount>> {
    if !path.exists() {
        debug!("No credentials file at {}", path.display());
        return Ok(None);
    }

    let raw = fs::read_to_string(path)?;
    let account = serde_json::from_str(&raw)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(account))
}

/// The account the server acts for: the refresh token from the environment
/// when set, otherwise whatever the `auth` command stored at `path`.
pub fn linked_account(config: &Config, path: Option<&Path>) -> io::Result<Option<LinkedAccount>> {
    if let Some(refresh_token) = &config.refresh_token {
        let mut credentials = GoogleCredentials::new(refresh_token.clone());
        credentials.access_token = config.access_token.clone();
        return Ok(Some(LinkedAccount {
            email: config.user_email.clone().unwrap_or_else(|| "me".to_string()),
            name: config.user_name.clone(),
            credentials,
        }));
    }

    match path {
        Some(path) => load_account(path),
        None => Ok(None),
    }
}
