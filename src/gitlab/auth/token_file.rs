//! OAuth token record and its on-disk JSON representation
//!
//! The file is only ever replaced atomically: the record is written to a
//! sibling `<file>.tmp` with owner-only permissions, flushed, then renamed
//! over the destination. Readers therefore see either the old or the new
//! record, never a torn write.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::gitlab::errors::AuthError;

/// OAuth access/refresh token pair plus the metadata needed to refresh it unattended
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Issue instant, seconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,

    /// Lifetime in seconds, relative to `created_at`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// Absolute expiry, seconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
}

impl OAuthToken {
    /// Absolute expiry: `expires_at` when present, else `created_at + expires_in`
    ///
    /// `None` means the token never expires.
    pub fn computed_expires_at(&self) -> Option<i64> {
        self.expires_at.or_else(|| match (self.created_at, self.expires_in) {
            (Some(created), Some(lifetime)) => Some(created.saturating_add(lifetime)),
            _ => None,
        })
    }

    /// `now >= expiry - skew`; negative skew counts as zero
    pub fn is_expired_at(&self, now: i64, skew_secs: i64) -> bool {
        match self.computed_expires_at() {
            Some(expires_at) => now >= expires_at.saturating_sub(skew_secs.max(0)),
            None => false,
        }
    }

    /// [`is_expired_at`](Self::is_expired_at) against the wall clock
    pub fn is_expired(&self, skew_secs: i64) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp(), skew_secs)
    }

    /// Fills client/redirect/endpoint metadata missing from `self` with the values of `previous`
    ///
    /// Token endpoints do not echo these back, so a refreshed record would
    /// otherwise lose them.
    pub fn inherit_metadata(mut self, previous: &OAuthToken) -> Self {
        if self.client_id.is_none() {
            self.client_id = previous.client_id.clone();
        }
        if self.redirect_uri.is_none() {
            self.redirect_uri = previous.redirect_uri.clone();
        }
        if self.token_endpoint.is_none() {
            self.token_endpoint = previous.token_endpoint.clone();
        }
        if self.scope.is_none() {
            self.scope = previous.scope.clone();
        }
        self
    }

    /// Copy of the record with `expires_at` materialized
    pub fn normalized(&self) -> Self {
        let mut token = self.clone();
        token.expires_at = self.computed_expires_at();
        token
    }
}

/// Default location of the token file when `GITLAB_OAUTH_TOKEN_FILE` is unset
///
/// `<config dir>/gitlab-mcp/oauth-token.json`, or the working directory when
/// the platform has no config dir.
pub fn default_token_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("gitlab-mcp").join("oauth-token.json"))
        .unwrap_or_else(|| PathBuf::from("gitlab-oauth-token.json"))
}

fn file_error(path: &Path, message: impl ToString) -> AuthError {
    AuthError::TokenFile {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

/// Reads and validates a token file
pub async fn read_token_file(path: &Path) -> Result<OAuthToken, AuthError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| file_error(path, e))?;
    let token: OAuthToken =
        serde_json::from_str(&raw).map_err(|e| file_error(path, format!("invalid JSON: {}", e)))?;
    if token.access_token.trim().is_empty() {
        return Err(file_error(path, "missing access_token"));
    }
    Ok(token)
}

/// Atomically replaces the token file with `token`
///
/// `expires_at` is materialized so later reads do not depend on the
/// `created_at`/`expires_in` pair.
pub async fn write_token_file(path: &Path, token: &OAuthToken) -> Result<(), AuthError> {
    let mut json = serde_json::to_string_pretty(&token.normalized())
        .map_err(|e| file_error(path, e))?;
    json.push('\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| file_error(path, e))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(&tmp_path)
        .await
        .map_err(|e| file_error(&tmp_path, e))?;
    file.write_all(json.as_bytes())
        .await
        .map_err(|e| file_error(&tmp_path, e))?;
    file.sync_all().await.map_err(|e| file_error(&tmp_path, e))?;
    drop(file);

    // The tmp file may predate this write with looser permissions.
    restrict_permissions(&tmp_path).await?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| file_error(path, e))?;
    restrict_permissions(path).await
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<(), AuthError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|e| file_error(path, e))
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<(), AuthError> {
    Ok(())
}
