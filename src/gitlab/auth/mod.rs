//! Credential provider for GitLab calls
//!
//! Two credential lifecycles sit behind one [`AuthProvider`]:
//!
//! - **Personal access token**: a fixed secret sent as `PRIVATE-TOKEN`.
//! - **OAuth**: an access token sent as `Authorization: Bearer`, loaded once
//!   from inline configuration or a token file, and refreshed when it is
//!   within 60 seconds of expiry.
//!
//! GitLab refresh tokens are single-use, so concurrent callers that observe
//! an expired token must share one refresh. The provider keeps a slot that
//! is either empty or holds a [`Shared`] refresh future; late arrivals clone
//! the future from the slot instead of starting another request.

pub mod login;
pub mod oauth;
pub mod pkce;
pub mod token_file;

use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use strum::{AsRefStr, Display, EnumString};
use tracing::{debug, info};

use self::oauth::{OAuthClient, token_endpoint_for};
use self::token_file::{OAuthToken, read_token_file, write_token_file};
use crate::gitlab::errors::AuthError;

/// Seconds before expiry at which a token is already treated as expired
pub const EXPIRY_SKEW_SECS: i64 = 60;

/// Header used for personal access tokens
pub const PRIVATE_TOKEN_HEADER: &str = "PRIVATE-TOKEN";

/// How the server authenticates against GitLab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum AuthMode {
    /// Personal/project/group access token
    #[strum(serialize = "pat")]
    Pat,
    /// OAuth access token, optionally refreshed from a token file
    #[strum(serialize = "oauth")]
    OAuth,
}

/// OAuth inputs for the credential provider
#[derive(Debug, Clone, Default)]
pub struct OAuthSettings {
    /// GitLab base URL; the refresh endpoint is `<host>/oauth/token`
    pub host: String,
    /// Inline access token; never refreshed
    pub access_token: Option<String>,
    /// Token file loaded on first use and rewritten after every refresh
    pub token_file: Option<PathBuf>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

type RefreshFuture = Shared<BoxFuture<'static, Result<String, AuthError>>>;

/// Produces a valid credential for every outbound call
#[derive(Clone)]
pub struct AuthProvider {
    credential: Credential,
}

#[derive(Clone)]
enum Credential {
    Static(String),
    OAuth(Arc<OAuthCredential>),
}

struct OAuthCredential {
    settings: OAuthSettings,
    http: reqwest::Client,
    skew_secs: i64,
    token: parking_lot::RwLock<Option<OAuthToken>>,
    load_lock: tokio::sync::Mutex<()>,
    in_flight: parking_lot::Mutex<Option<RefreshFuture>>,
}

impl std::fmt::Debug for AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthProvider")
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

impl AuthProvider {
    /// Provider for a personal access token
    pub fn personal_access_token(token: impl Into<String>) -> Self {
        Self {
            credential: Credential::Static(token.into()),
        }
    }

    /// Provider for OAuth; nothing is read until the first call
    pub fn oauth(settings: OAuthSettings, http: reqwest::Client) -> Self {
        Self {
            credential: Credential::OAuth(Arc::new(OAuthCredential {
                settings,
                http,
                skew_secs: EXPIRY_SKEW_SECS,
                token: parking_lot::RwLock::new(None),
                load_lock: tokio::sync::Mutex::new(()),
                in_flight: parking_lot::Mutex::new(None),
            })),
        }
    }

    pub fn mode(&self) -> AuthMode {
        match self.credential {
            Credential::Static(_) => AuthMode::Pat,
            Credential::OAuth(_) => AuthMode::OAuth,
        }
    }

    /// Current secret, refreshing it first when it is about to expire
    pub async fn token(&self) -> Result<String, AuthError> {
        match &self.credential {
            Credential::Static(token) => Ok(token.clone()),
            Credential::OAuth(inner) => inner.token().await,
        }
    }

    /// Headers authenticating one request
    pub async fn auth_headers(&self) -> Result<HeaderMap, AuthError> {
        let token = self.token().await?;
        let (name, value) = match self.mode() {
            AuthMode::Pat => (HeaderName::from_static("private-token"), token),
            AuthMode::OAuth => (AUTHORIZATION, format!("Bearer {}", token)),
        };
        let mut value = HeaderValue::from_str(&value).map_err(|_| AuthError::InvalidHeader)?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(name, value);
        Ok(headers)
    }

    /// Drops the cached OAuth record and reads it again from its source
    pub async fn reload(&self) -> Result<(), AuthError> {
        match &self.credential {
            Credential::Static(_) => Ok(()),
            Credential::OAuth(inner) => {
                let _guard = inner.load_lock.lock().await;
                let token = inner.load().await?;
                *inner.token.write() = Some(token);
                Ok(())
            }
        }
    }
}

impl OAuthCredential {
    async fn token(self: &Arc<Self>) -> Result<String, AuthError> {
        self.load_if_needed().await?;

        let current = self.current()?;
        if self.settings.token_file.is_none() || !current.is_expired(self.skew_secs) {
            return Ok(current.access_token);
        }

        let refresh = {
            let mut slot = self.in_flight.lock();
            match slot.as_ref() {
                Some(pending) => {
                    debug!("Joining in-flight OAuth refresh");
                    pending.clone()
                }
                None => {
                    // A refresh may have finished between the expiry check and the lock.
                    let latest = self.current()?;
                    if !latest.is_expired(self.skew_secs) {
                        return Ok(latest.access_token);
                    }
                    let refresh_token = latest
                        .refresh_token
                        .clone()
                        .ok_or(AuthError::Unrefreshable)?;
                    let client = self
                        .refresh_client(&latest)
                        .ok_or(AuthError::MissingRefreshMetadata)?;
                    let pending = Arc::clone(self)
                        .refresh(client, refresh_token, latest)
                        .boxed()
                        .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        let outcome = refresh.clone().await;

        let mut slot = self.in_flight.lock();
        if slot
            .as_ref()
            .is_some_and(|pending| pending.ptr_eq(&refresh))
        {
            *slot = None;
        }
        outcome
    }

    async fn refresh(
        self: Arc<Self>,
        client: OAuthClient,
        refresh_token: String,
        previous: OAuthToken,
    ) -> Result<String, AuthError> {
        info!("Refreshing GitLab OAuth token");
        let mut refreshed = client
            .refresh(&self.http, &refresh_token)
            .await?
            .inherit_metadata(&previous);
        if previous.token_endpoint.is_some() {
            refreshed.token_endpoint = previous.token_endpoint.clone();
        }
        let refreshed = refreshed.normalized();
        let access_token = refreshed.access_token.clone();

        // The old refresh token is spent; keep the new record even if persisting fails.
        *self.token.write() = Some(refreshed.clone());
        if let Some(path) = &self.settings.token_file {
            write_token_file(path, &refreshed).await?;
        }
        Ok(access_token)
    }

    fn refresh_client(&self, token: &OAuthToken) -> Option<OAuthClient> {
        let client_id = self
            .settings
            .client_id
            .clone()
            .or_else(|| token.client_id.clone())?;
        let redirect_uri = self
            .settings
            .redirect_uri
            .clone()
            .or_else(|| token.redirect_uri.clone())?;
        Some(OAuthClient {
            token_endpoint: token_endpoint_for(&self.settings.host),
            client_id,
            client_secret: self.settings.client_secret.clone(),
            redirect_uri,
        })
    }

    fn current(&self) -> Result<OAuthToken, AuthError> {
        self.token
            .read()
            .clone()
            .ok_or_else(|| AuthError::NotConfigured("OAuth token state not loaded.".to_string()))
    }

    async fn load_if_needed(&self) -> Result<(), AuthError> {
        if self.token.read().is_some() {
            return Ok(());
        }
        let _guard = self.load_lock.lock().await;
        if self.token.read().is_some() {
            return Ok(());
        }
        let token = self.load().await?;
        *self.token.write() = Some(token);
        Ok(())
    }

    async fn load(&self) -> Result<OAuthToken, AuthError> {
        if let Some(access_token) = self.settings.access_token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(OAuthToken {
                access_token: access_token.clone(),
                ..Default::default()
            });
        }
        match &self.settings.token_file {
            Some(path) => {
                let token = read_token_file(path).await?;
                debug!(path = %path.display(), "Loaded OAuth token file");
                Ok(token)
            }
            None => Err(AuthError::NotConfigured(
                "OAuth mode requires GITLAB_OAUTH_ACCESS_TOKEN or GITLAB_OAUTH_TOKEN_FILE."
                    .to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn personal_access_token_uses_private_token_header() {
        let provider = AuthProvider::personal_access_token("glpat-123");
        let headers = provider.auth_headers().await.unwrap();
        assert_eq!(headers.get(PRIVATE_TOKEN_HEADER).unwrap(), "glpat-123");
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn inline_oauth_token_is_sent_as_bearer() {
        let provider = AuthProvider::oauth(
            OAuthSettings {
                host: "https://gitlab.example".into(),
                access_token: Some("inline".into()),
                ..Default::default()
            },
            reqwest::Client::new(),
        );
        let headers = provider.auth_headers().await.unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer inline");
        assert_eq!(provider.mode(), AuthMode::OAuth);
    }

    #[tokio::test]
    async fn oauth_without_source_is_not_configured() {
        let provider = AuthProvider::oauth(OAuthSettings::default(), reqwest::Client::new());
        assert!(matches!(
            provider.token().await,
            Err(AuthError::NotConfigured(_))
        ));
    }

    #[test]
    fn auth_mode_parses_lowercase() {
        assert_eq!("pat".parse::<AuthMode>().ok(), Some(AuthMode::Pat));
        assert_eq!("oauth".parse::<AuthMode>().ok(), Some(AuthMode::OAuth));
        assert!("basic".parse::<AuthMode>().is_err());
    }
}
