//! Interactive Authorization Code + PKCE login and offline token-file refresh
//!
//! The login binds a loopback listener on `127.0.0.1:0` and serves
//! `/oauth/callback` until one callback arrives. When an external redirect
//! URI is configured the callback cannot be captured, so the operator pastes
//! the redirected URL instead. Both paths go through [`validate_callback`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use url::Url;

use super::oauth::{OAuthClient, token_endpoint_for};
use super::pkce::PkceChallenge;
use super::token_file::{OAuthToken, read_token_file, write_token_file};
use crate::gitlab::errors::AuthError;

/// Path served by the loopback listener
pub const CALLBACK_PATH: &str = "/oauth/callback";

/// How long the login waits for the browser to come back
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Inputs of `gitlab-mcp auth login`
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub host: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    /// Fixed redirect URI; switches to manual paste mode when set
    pub redirect_uri: Option<String>,
    pub scopes: String,
    pub out: PathBuf,
    pub timeout: Duration,
}

/// Inputs of `gitlab-mcp auth refresh`
#[derive(Debug, Clone)]
pub struct RefreshRequest {
    pub host: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub file: PathBuf,
}

/// Operator interaction during login
#[async_trait]
pub trait LoginPrompt: Send {
    /// Shows the URL the operator has to open
    async fn show_authorization_url(&mut self, url: &str, redirect_uri: &str);

    /// Reads the full redirected URL in manual paste mode
    async fn read_redirected_url(&mut self) -> Result<String, AuthError>;
}

/// [`LoginPrompt`] on the process terminal
#[derive(Debug, Default)]
pub struct TerminalPrompt;

#[async_trait]
impl LoginPrompt for TerminalPrompt {
    async fn show_authorization_url(&mut self, url: &str, redirect_uri: &str) {
        println!("Open this URL in your browser to authorize:\n\n{}\n", url);
        println!("Waiting for OAuth callback on {} ...", redirect_uri);
    }

    async fn read_redirected_url(&mut self) -> Result<String, AuthError> {
        let mut stdout = tokio::io::stdout();
        let _ = stdout
            .write_all(b"\nAfter authorizing, paste the full redirected URL here:\n> ")
            .await;
        let _ = stdout.flush().await;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| AuthError::Callback(format!("failed to read pasted URL: {}", e)))?;
        Ok(line.trim().to_string())
    }
}

/// Normalizes a scope list: commas become spaces, whitespace collapses
pub fn normalize_scopes(raw: &str) -> String {
    let scopes = raw
        .replace(',', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if scopes.is_empty() {
        "read_api".to_string()
    } else {
        scopes
    }
}

/// `<host>/oauth/authorize` with the PKCE challenge and state attached
pub fn authorization_url(
    host: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &str,
    pkce: &PkceChallenge,
) -> Result<Url, AuthError> {
    let mut url = Url::parse(&format!("{}/oauth/authorize", host.trim_end_matches('/')))
        .map_err(|e| AuthError::NotConfigured(format!("invalid GitLab host '{}': {}", host, e)))?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("state", &pkce.state)
        .append_pair("scope", scopes)
        .append_pair("code_challenge", &pkce.code_challenge)
        .append_pair("code_challenge_method", pkce.challenge_method());
    Ok(url)
}

/// Extracts the authorization code from callback query parameters
///
/// Checked in order: provider error, missing code, missing state, state mismatch.
pub fn validate_callback(
    params: &HashMap<String, String>,
    expected_state: &str,
) -> Result<String, AuthError> {
    if let Some(err) = params.get("error") {
        let detail = params
            .get("error_description")
            .map(|d| format!(" ({})", d))
            .unwrap_or_default();
        return Err(AuthError::Callback(format!("OAuth error: {}{}", err, detail)));
    }
    let code = params
        .get("code")
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::Callback("missing 'code' in callback URL".to_string()))?;
    let state = params
        .get("state")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AuthError::Callback("missing 'state' in callback URL".to_string()))?;
    if state != expected_state {
        return Err(AuthError::Callback("state mismatch".to_string()));
    }
    Ok(code.clone())
}

/// Validates a pasted redirect URL
pub fn parse_redirected_url(pasted: &str, expected_state: &str) -> Result<String, AuthError> {
    let url = Url::parse(pasted.trim())
        .map_err(|e| AuthError::Callback(format!("pasted text is not a URL: {}", e)))?;
    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    validate_callback(&params, expected_state)
}

#[derive(Clone)]
struct CallbackState {
    expected_state: String,
    outcome: mpsc::Sender<Result<String, AuthError>>,
}

/// Loopback listener receiving exactly one OAuth redirect
pub struct CallbackListener {
    redirect_uri: String,
    outcome: mpsc::Receiver<Result<String, AuthError>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Binds `127.0.0.1:0` and starts serving [`CALLBACK_PATH`]
    pub async fn start(expected_state: String) -> Result<Self, AuthError> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| AuthError::Callback(format!("failed to bind loopback listener: {}", e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::Callback(format!("failed to read listener address: {}", e)))?
            .port();

        let (tx, rx) = mpsc::channel(1);
        let app = Router::new()
            .route(CALLBACK_PATH, get(handle_callback))
            .with_state(CallbackState {
                expected_state,
                outcome: tx,
            });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!("OAuth callback listener error: {}", err);
            }
        });

        let redirect_uri = format!("http://127.0.0.1:{}{}", port, CALLBACK_PATH);
        info!(redirect_uri = %redirect_uri, "OAuth callback listener ready");
        Ok(Self {
            redirect_uri,
            outcome: rx,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Waits for the first callback, then stops the listener
    pub async fn wait_for_code(mut self, timeout: Duration) -> Result<String, AuthError> {
        let outcome = tokio::time::timeout(timeout, self.outcome.recv()).await;
        self.shutdown().await;
        match outcome {
            Ok(Some(result)) => result,
            Ok(None) => Err(AuthError::Callback(
                "callback listener stopped before a redirect arrived".to_string(),
            )),
            Err(_) => Err(AuthError::Callback(format!(
                "timed out after {}s waiting for the OAuth redirect",
                timeout.as_secs()
            ))),
        }
    }

    async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

const SUCCESS_PAGE: &str = "<!doctype html><meta charset=\"utf-8\" /><title>gitlab-mcp</title>\
     <h2>Authentication complete</h2>\
     <p>You can close this tab and return to your terminal.</p>";

/// Failure pages echo query text, so they are never served as HTML
fn plain_text(status: StatusCode, body: String) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        body,
    )
        .into_response()
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    // A redirect without our state cannot end the login.
    if params.get("state") != Some(&state.expected_state) {
        warn!("Ignoring OAuth callback without the expected state");
        return plain_text(
            StatusCode::BAD_REQUEST,
            "Authentication failed: state mismatch".to_string(),
        );
    }
    let result = validate_callback(&params, &state.expected_state);
    let response = match &result {
        Ok(_) => (StatusCode::OK, Html(SUCCESS_PAGE)).into_response(),
        Err(err) => plain_text(
            StatusCode::BAD_REQUEST,
            format!("Authentication failed: {}", err),
        ),
    };
    // Only the first redirect counts.
    let _ = state.outcome.try_send(result);
    response
}

/// Runs the full login and writes the token file
pub async fn login(
    http: &reqwest::Client,
    request: &LoginRequest,
    prompt: &mut dyn LoginPrompt,
) -> Result<OAuthToken, AuthError> {
    let pkce = PkceChallenge::generate();
    let scopes = normalize_scopes(&request.scopes);

    let (redirect_uri, listener) = match &request.redirect_uri {
        Some(uri) => (uri.clone(), None),
        None => {
            let listener = CallbackListener::start(pkce.state.clone()).await?;
            (listener.redirect_uri().to_string(), Some(listener))
        }
    };

    let url = authorization_url(
        &request.host,
        &request.client_id,
        &redirect_uri,
        &scopes,
        &pkce,
    )?;
    prompt
        .show_authorization_url(url.as_str(), &redirect_uri)
        .await;

    let code = match listener {
        Some(listener) => listener.wait_for_code(request.timeout).await?,
        None => {
            let pasted = prompt.read_redirected_url().await?;
            parse_redirected_url(&pasted, &pkce.state)?
        }
    };

    let client = OAuthClient {
        token_endpoint: token_endpoint_for(&request.host),
        client_id: request.client_id.clone(),
        client_secret: request.client_secret.clone(),
        redirect_uri,
    };
    let token = client
        .exchange_code(http, &code, &pkce.code_verifier)
        .await?;
    write_token_file(&request.out, &token).await?;
    info!(path = %request.out.display(), "Wrote OAuth token file");
    Ok(token)
}

/// Refreshes a token file in place using its stored metadata
///
/// The stored `token_endpoint` wins over the host-derived one so a file
/// keeps working even when `--host` is omitted.
pub async fn refresh_token_file(
    http: &reqwest::Client,
    request: &RefreshRequest,
) -> Result<OAuthToken, AuthError> {
    let current = read_token_file(&request.file).await?;
    let refresh_token = current
        .refresh_token
        .clone()
        .ok_or(AuthError::Unrefreshable)?;

    let client_id = request
        .client_id
        .clone()
        .or_else(|| current.client_id.clone());
    let redirect_uri = request
        .redirect_uri
        .clone()
        .or_else(|| current.redirect_uri.clone());
    let (Some(client_id), Some(redirect_uri)) = (client_id, redirect_uri) else {
        return Err(AuthError::MissingRefreshMetadata);
    };

    let client = OAuthClient {
        token_endpoint: current
            .token_endpoint
            .clone()
            .unwrap_or_else(|| token_endpoint_for(&request.host)),
        client_id,
        client_secret: request.client_secret.clone(),
        redirect_uri,
    };
    let refreshed = client
        .refresh(http, &refresh_token)
        .await?
        .inherit_metadata(&current);
    write_token_file(&request.file, &refreshed).await?;
    info!(path = %request.file.display(), "Refreshed OAuth token file");
    Ok(refreshed)
}
