//! Token endpoint calls: refresh and authorization-code exchange
//!
//! Both are `application/x-www-form-urlencoded` POSTs answered with a JSON
//! token record. A `created_at` is stamped when the endpoint omits it so the
//! lifetime can still be turned into an absolute expiry.

use serde::Deserialize;

use super::token_file::OAuthToken;
use crate::gitlab::errors::{AuthError, snippet};

/// Client registration values sent with every token endpoint request
#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
}

/// Token endpoint URL for a GitLab host
pub fn token_endpoint_for(host: &str) -> String {
    format!("{}/oauth/token", host.trim_end_matches('/'))
}

/// Subset of the token endpoint response we keep
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    refresh_token: Option<String>,
    scope: Option<String>,
    created_at: Option<i64>,
    expires_in: Option<i64>,
}

impl OAuthClient {
    /// Trades a refresh token for a new token pair
    pub async fn refresh(
        &self,
        http: &reqwest::Client,
        refresh_token: &str,
    ) -> Result<OAuthToken, AuthError> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        if let Some(secret) = self.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }
        self.request_token(http, "refresh", &form).await
    }

    /// Trades an authorization code plus PKCE verifier for a token pair
    pub async fn exchange_code(
        &self,
        http: &reqwest::Client,
        code: &str,
        code_verifier: &str,
    ) -> Result<OAuthToken, AuthError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ];
        if let Some(secret) = self.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }
        self.request_token(http, "code exchange", &form).await
    }

    async fn request_token(
        &self,
        http: &reqwest::Client,
        operation: &'static str,
        form: &[(&str, &str)],
    ) -> Result<OAuthToken, AuthError> {
        let network = |e: reqwest::Error| AuthError::Network {
            operation,
            message: e.to_string(),
        };

        let response = http
            .post(&self.token_endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        let body = response.text().await.map_err(network)?;
        if !status.is_success() {
            return Err(AuthError::TokenEndpoint {
                operation,
                status: status.as_u16(),
                body: snippet(&body, 500),
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| AuthError::Network {
            operation,
            message: format!("invalid token response: {}", e),
        })?;
        let access_token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::Network {
                operation,
                message: "missing access_token in response".to_string(),
            })?;

        Ok(OAuthToken {
            access_token,
            token_type: parsed.token_type,
            refresh_token: parsed.refresh_token,
            scope: parsed.scope,
            created_at: parsed
                .created_at
                .or_else(|| Some(chrono::Utc::now().timestamp())),
            expires_in: parsed.expires_in,
            expires_at: None,
            client_id: Some(self.client_id.clone()),
            redirect_uri: Some(self.redirect_uri.clone()),
            token_endpoint: Some(self.token_endpoint.clone()),
        })
    }
}
