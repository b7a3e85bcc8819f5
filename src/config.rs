//! Environment configuration
//!
//! Everything the server needs is read once at startup. [`Config::from_env`]
//! reads the process environment and [`Config::from_vars`] parses any
//! key/value source, which keeps the parsing testable without touching
//! global state.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use crate::gitlab::auth::{AuthMode, OAuthSettings};
use crate::gitlab::client::{ClientOptions, default_user_agent};
use crate::policy::Policy;

pub const DEFAULT_HOST: &str = "https://gitlab.com";
pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 3000;
pub const DEFAULT_HTTP_PATH: &str = "/mcp";
pub const DEFAULT_MAX_SESSIONS: usize = 200;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} is required when GITLAB_AUTH_MODE={mode}")]
    Missing { key: &'static str, mode: &'static str },

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("GITLAB_HOST '{0}' is not in GITLAB_MCP_HOST_ALLOWLIST")]
    HostNotAllowed(String),
}

/// Settings for the networked transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Always starts with `/`
    pub path: String,
    /// Accepted `Host` header values; empty accepts any
    pub allowed_hosts: Vec<String>,
    pub stateful: bool,
    pub max_sessions: usize,
    pub bearer_token: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HTTP_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
            path: DEFAULT_HTTP_PATH.to_string(),
            allowed_hosts: Vec::new(),
            stateful: true,
            max_sessions: DEFAULT_MAX_SESSIONS,
            bearer_token: None,
        }
    }
}

impl HttpConfig {
    /// Socket address to bind; names other than `localhost` must be IPs
    pub fn bind_address(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = match self.host.as_str() {
            "localhost" => IpAddr::from([127, 0, 0, 1]),
            other => other.parse().map_err(|_| ConfigError::Invalid {
                key: "GITLAB_MCP_HTTP_HOST",
                message: format!("'{}' is not an IP address", other),
            })?,
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Full runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// GitLab base URL without trailing slash
    pub host: String,
    pub auth_mode: AuthMode,
    pub token: Option<String>,
    pub trigger_token: Option<String>,
    pub oauth_access_token: Option<String>,
    pub oauth_token_file: Option<PathBuf>,
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: Option<String>,
    pub oauth_redirect_uri: Option<String>,
    pub user_agent: String,
    pub log_level: Option<String>,
    pub read_only: bool,
    pub enabled_tools: Vec<String>,
    pub disabled_tools: Vec<String>,
    pub write_project_allowlist: Vec<String>,
    pub host_allowlist: Vec<String>,
    pub max_attempts: u32,
    pub artifact_dir: PathBuf,
    pub http: HttpConfig,
}

/// Lookup over a snapshot of variables; blank values count as unset
struct Vars(HashMap<String, String>);

impl Vars {
    fn get(&self, key: &str) -> Option<String> {
        self.0
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
                key,
                message: format!("'{}' is not a boolean", raw),
            }),
        }
    }

    fn number<T>(&self, key: &'static str, default: T, min: T, max: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr + PartialOrd + std::fmt::Display + Copy,
    {
        let Some(raw) = self.get(key) else {
            return Ok(default);
        };
        let value: T = raw.parse().map_err(|_| ConfigError::Invalid {
            key,
            message: format!("'{}' is not a number", raw),
        })?;
        if value < min || value > max {
            return Err(ConfigError::Invalid {
                key,
                message: format!("{} is outside {}..={}", value, min, max),
            });
        }
        Ok(value)
    }

    fn list(&self, key: &str) -> Vec<String> {
        self.get(key).map(|raw| parse_csv(&raw)).unwrap_or_default()
    }
}

/// `1/true/yes/y/on` and `0/false/no/n/off`, case-insensitive
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Comma separated list with blanks dropped
pub fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize_host(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed).map_err(|e| ConfigError::Invalid {
        key: "GITLAB_HOST",
        message: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            key: "GITLAB_HOST",
            message: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(trimmed.to_string())
}

fn host_allowed(host: &str, allowlist: &[String]) -> bool {
    if allowlist.is_empty() {
        return true;
    }
    let hostname = Url::parse(host)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string));
    allowlist.iter().any(|entry| {
        let entry = entry.trim_end_matches('/');
        entry.eq_ignore_ascii_case(host) || hostname.as_deref().is_some_and(|h| entry.eq_ignore_ascii_case(h))
    })
}

fn normalize_path(raw: Option<String>) -> String {
    match raw {
        Some(path) if path.starts_with('/') => path,
        Some(path) => format!("/{}", path),
        None => DEFAULT_HTTP_PATH.to_string(),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = Vars(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );

        let host = normalize_host(&vars.get("GITLAB_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()))?;
        let auth_mode = match vars.get("GITLAB_AUTH_MODE") {
            None => AuthMode::Pat,
            Some(raw) => raw
                .to_ascii_lowercase()
                .parse()
                .map_err(|_| ConfigError::Invalid {
                    key: "GITLAB_AUTH_MODE",
                    message: format!("'{}' is not one of pat, oauth", raw),
                })?,
        };

        let http = HttpConfig {
            host: vars
                .get("GITLAB_MCP_HTTP_HOST")
                .unwrap_or_else(|| DEFAULT_HTTP_HOST.to_string()),
            port: vars.number("GITLAB_MCP_HTTP_PORT", DEFAULT_HTTP_PORT, 1, u16::MAX)?,
            path: normalize_path(vars.get("GITLAB_MCP_HTTP_PATH")),
            allowed_hosts: vars.list("GITLAB_MCP_HTTP_ALLOWED_HOSTS"),
            stateful: vars.flag("GITLAB_MCP_HTTP_STATEFUL", true)?,
            max_sessions: vars.number("GITLAB_MCP_HTTP_MAX_SESSIONS", DEFAULT_MAX_SESSIONS, 1, 10_000)?,
            bearer_token: vars.get("GITLAB_MCP_HTTP_BEARER_TOKEN"),
        };

        let config = Self {
            host,
            auth_mode,
            token: vars.get("GITLAB_TOKEN"),
            trigger_token: vars.get("GITLAB_TRIGGER_TOKEN"),
            oauth_access_token: vars.get("GITLAB_OAUTH_ACCESS_TOKEN"),
            oauth_token_file: vars.get("GITLAB_OAUTH_TOKEN_FILE").map(PathBuf::from),
            oauth_client_id: vars.get("GITLAB_OAUTH_CLIENT_ID"),
            oauth_client_secret: vars.get("GITLAB_OAUTH_CLIENT_SECRET"),
            oauth_redirect_uri: vars.get("GITLAB_OAUTH_REDIRECT_URI"),
            user_agent: vars
                .get("GITLAB_USER_AGENT")
                .unwrap_or_else(default_user_agent),
            log_level: vars.get("LOG_LEVEL").map(|l| l.to_ascii_lowercase()),
            read_only: vars.flag("GITLAB_MCP_READ_ONLY", false)?,
            enabled_tools: vars.list("GITLAB_MCP_ENABLED_TOOLS"),
            disabled_tools: vars.list("GITLAB_MCP_DISABLED_TOOLS"),
            write_project_allowlist: vars.list("GITLAB_MCP_WRITE_PROJECT_ALLOWLIST"),
            host_allowlist: vars.list("GITLAB_MCP_HOST_ALLOWLIST"),
            max_attempts: vars.number("GITLAB_MCP_MAX_ATTEMPTS", 4, 1, 10)?,
            artifact_dir: vars
                .get("GITLAB_MCP_ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("gitlab-mcp-artifacts")),
            http,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that the selected auth mode has a credential source
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.auth_mode {
            AuthMode::Pat if self.token.is_none() => {
                return Err(ConfigError::Missing {
                    key: "GITLAB_TOKEN",
                    mode: "pat",
                });
            }
            AuthMode::OAuth if self.oauth_access_token.is_none() && self.oauth_token_file.is_none() => {
                return Err(ConfigError::Missing {
                    key: "GITLAB_OAUTH_ACCESS_TOKEN or GITLAB_OAUTH_TOKEN_FILE",
                    mode: "oauth",
                });
            }
            _ => {}
        }
        if !host_allowed(&self.host, &self.host_allowlist) {
            return Err(ConfigError::HostNotAllowed(self.host.clone()));
        }
        Ok(())
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            host: self.host.clone(),
            user_agent: self.user_agent.clone(),
            max_attempts: self.max_attempts,
            trigger_token: self.trigger_token.clone(),
            artifact_dir: self.artifact_dir.clone(),
        }
    }

    pub fn oauth_settings(&self) -> OAuthSettings {
        OAuthSettings {
            host: self.host.clone(),
            access_token: self.oauth_access_token.clone(),
            token_file: self.oauth_token_file.clone(),
            client_id: self.oauth_client_id.clone(),
            client_secret: self.oauth_client_secret.clone(),
            redirect_uri: self.oauth_redirect_uri.clone(),
        }
    }

    pub fn policy(&self) -> Policy {
        Policy::new(
            self.read_only,
            &self.enabled_tools,
            &self.disabled_tools,
            &self.write_project_allowlist,
        )
    }
}
