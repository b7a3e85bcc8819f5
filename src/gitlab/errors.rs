//! Error taxonomy for the GitLab access layer
//!
//! Every fallible operation of the access layer returns [`GitlabError`].
//! Credential failures are kept in their own [`AuthError`] type because a
//! single refresh outcome is shared by every concurrent waiter, so it must be
//! cheap to clone.
//!
//! HTTP status extraction goes through a small ordered list of probes
//! ([`GitlabError::http_status`]) and [`to_public_error`] turns any error into
//! the text that is handed back to MCP clients.

use serde::Serialize;
use thiserror::Error;

/// Errors produced by the credential provider and the OAuth helpers
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No usable credential is configured for the selected auth mode
    #[error("{0}")]
    NotConfigured(String),

    /// The token is expired and there is no refresh token to renew it
    #[error(
        "OAuth token is expired and no refresh_token is available. Run `gitlab-mcp auth refresh` or `gitlab-mcp auth login` to re-authenticate."
    )]
    Unrefreshable,

    /// The token is expired and the client id / redirect URI needed to refresh it are unknown
    #[error(
        "OAuth token refresh requires GITLAB_OAUTH_CLIENT_ID and GITLAB_OAUTH_REDIRECT_URI (or the token file must include client_id and redirect_uri). Run `gitlab-mcp auth login` to re-authenticate."
    )]
    MissingRefreshMetadata,

    /// The token endpoint rejected a refresh or code exchange
    #[error("OAuth {operation} failed ({status}): {body}")]
    TokenEndpoint {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The token endpoint could not be reached
    #[error("OAuth {operation} request failed: {message}")]
    Network {
        operation: &'static str,
        message: String,
    },

    /// Reading, parsing or writing the token file failed
    #[error("OAuth token file {path}: {message}")]
    TokenFile { path: String, message: String },

    /// The interactive login callback was invalid
    #[error("OAuth callback rejected: {0}")]
    Callback(String),

    /// The credential cannot be encoded as an HTTP header value
    #[error("credential contains characters that are not valid in an HTTP header")]
    InvalidHeader,
}

impl AuthError {
    /// HTTP status reported by the token endpoint, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::TokenEndpoint { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error means the operator has to log in again
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            AuthError::Unrefreshable
                | AuthError::MissingRefreshMetadata
                | AuthError::TokenEndpoint { .. }
        )
    }
}

/// Errors produced by the access facade, the retrying executor and the streaming primitives
#[derive(Debug, Error)]
pub enum GitlabError {
    /// GitLab answered with a non-success status
    #[error("{message}")]
    Api { status: u16, message: String },

    /// The request never produced a usable response
    #[error("GitLab request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// No valid credential could be produced for the call
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Arguments were rejected before any network call
    #[error("Invalid arguments: {0}")]
    InvalidArgument(String),

    /// Declared artifact size is over the configured ceiling
    #[error(
        "Artifacts archive is too large: declared size {declared} bytes exceeds max_bytes={limit}."
    )]
    ArtifactTooLarge { declared: u64, limit: u64 },

    /// Streamed bytes went over the configured ceiling
    #[error("Artifacts download exceeds limit of {limit} bytes; partial file removed.")]
    DownloadLimitExceeded { limit: u64 },

    /// No trigger token was supplied or configured
    #[error(
        "Pipeline trigger token is required: pass `token` or set GITLAB_TRIGGER_TOKEN in the server environment."
    )]
    MissingTriggerToken,

    /// Local filesystem failure (artifact destination, temp files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A response body did not have the expected shape
    #[error("Unexpected GitLab response: {0}")]
    Decode(String),
}

/// Result alias used across the access layer
pub type GitlabResult<T> = Result<T, GitlabError>;

impl GitlabError {
    /// Builds an [`GitlabError::Api`] from a status and the raw response body
    ///
    /// The body is cut to 500 characters so large HTML error pages do not end
    /// up in tool output.
    pub fn api(status: u16, body: &str) -> Self {
        GitlabError::Api {
            status,
            message: format!("GitLab API error ({}): {}", status, snippet(body, 500)),
        }
    }

    /// HTTP status associated with this error, if one can be found
    ///
    /// Probes run in order and the first hit wins.
    pub fn http_status(&self) -> Option<u16> {
        STATUS_PROBES.iter().find_map(|probe| probe(self))
    }

    /// Whether the executor may try the call again
    pub fn is_retryable(&self) -> bool {
        self.http_status().is_some_and(is_retryable_status)
    }
}

/// Statuses that indicate a transient remote failure
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

type StatusProbe = fn(&GitlabError) -> Option<u16>;

const STATUS_PROBES: &[StatusProbe] = &[
    api_status,
    transport_status,
    auth_status,
    source_chain_status,
];

fn api_status(err: &GitlabError) -> Option<u16> {
    match err {
        GitlabError::Api { status, .. } => Some(*status),
        _ => None,
    }
}

fn transport_status(err: &GitlabError) -> Option<u16> {
    match err {
        GitlabError::Transport(e) => e.status().map(|s| s.as_u16()),
        _ => None,
    }
}

fn auth_status(err: &GitlabError) -> Option<u16> {
    match err {
        GitlabError::Auth(e) => e.status(),
        _ => None,
    }
}

/// Walks the `source()` chain looking for a wrapped reqwest error that carries a status
fn source_chain_status(err: &GitlabError) -> Option<u16> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(err);
    while let Some(e) = current {
        if let Some(status) = e
            .downcast_ref::<reqwest::Error>()
            .and_then(|re| re.status())
        {
            return Some(status.as_u16());
        }
        current = e.source();
    }
    None
}

/// Error shape returned to MCP clients
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PublicError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
}

/// Maps an access-layer error to client-facing text
///
/// Well-known statuses get a short hint; credential errors keep their
/// re-authentication instructions.
pub fn to_public_error(err: &GitlabError) -> PublicError {
    if let GitlabError::Auth(auth) = err {
        if auth.requires_reauthentication() || auth.status().is_none() {
            return PublicError {
                status: auth.status(),
                message: auth.to_string(),
            };
        }
    }

    let status = err.http_status();
    let message = match status {
        Some(401) => "Unauthorized (401): check GITLAB_TOKEN.".to_string(),
        Some(403) => "Forbidden (403): token lacks access to this resource.".to_string(),
        Some(404) => {
            "Not found (404): project/resource does not exist or is not accessible.".to_string()
        }
        Some(429) => "Rate limited (429): try again later.".to_string(),
        Some(s) if s >= 500 => format!("GitLab server error ({}).", s),
        _ => err.to_string(),
    };
    PublicError { status, message }
}

/// Cuts `text` to at most `max_chars` characters, appending `...` when cut
pub(crate) fn snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_well_known_statuses() {
        let unauthorized = to_public_error(&GitlabError::api(401, "nope"));
        assert_eq!(unauthorized.status, Some(401));
        assert!(unauthorized.message.starts_with("Unauthorized"));

        let missing = to_public_error(&GitlabError::api(404, "{\"message\":\"404 Not Found\"}"));
        assert!(missing.message.starts_with("Not found"));

        let server = to_public_error(&GitlabError::api(502, "bad gateway"));
        assert_eq!(server.message, "GitLab server error (502).");
    }

    #[test]
    fn keeps_message_for_other_client_errors() {
        let err = GitlabError::api(422, "{\"message\":\"branch exists\"}");
        let public = to_public_error(&err);
        assert_eq!(public.status, Some(422));
        assert!(public.message.contains("branch exists"));
    }

    #[test]
    fn credential_errors_name_the_reauthentication_path() {
        let public = to_public_error(&GitlabError::Auth(AuthError::Unrefreshable));
        assert_eq!(public.status, None);
        assert!(public.message.contains("auth refresh"));
    }

    #[test]
    fn retryable_classification() {
        assert!(GitlabError::api(429, "").is_retryable());
        assert!(GitlabError::api(500, "").is_retryable());
        assert!(GitlabError::api(599, "").is_retryable());
        assert!(!GitlabError::api(404, "").is_retryable());
        assert!(!GitlabError::InvalidArgument("x".into()).is_retryable());
    }

    #[test]
    fn snippet_is_char_boundary_safe() {
        assert_eq!(snippet("héllo", 2), "hé...");
        assert_eq!(snippet("abc", 5), "abc");
    }
}
