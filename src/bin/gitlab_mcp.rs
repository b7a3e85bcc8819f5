use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gitlab_mcp::config::{Config, DEFAULT_HOST};
use gitlab_mcp::gitlab::auth::login::{
    DEFAULT_CALLBACK_TIMEOUT, LoginRequest, RefreshRequest, TerminalPrompt, login,
    refresh_token_file,
};
use gitlab_mcp::gitlab::auth::token_file::default_token_path;
use gitlab_mcp::gitlab::{AuthMode, AuthProvider, GitlabClient};
use gitlab_mcp::tools::GitLabTools;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server in stdin/stdout mode
    Stdio {
        /// Enable debug logging
        #[arg(short, long)]
        debug: bool,

        /// GitLab personal access token (overrides GITLAB_TOKEN)
        #[arg(short = 't', long)]
        token: Option<String>,
    },
    /// Run the server over HTTP
    Http {
        /// Address to bind, e.g. 127.0.0.1:3000 (overrides GITLAB_MCP_HTTP_HOST/PORT)
        #[arg(short, long)]
        address: Option<SocketAddr>,

        /// Enable debug logging
        #[arg(short, long)]
        debug: bool,

        /// Serve every request with a fresh server and no session
        #[arg(long)]
        stateless: bool,
    },
    /// Manage OAuth token files
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Args)]
struct OAuthClientArgs {
    /// GitLab base URL
    #[arg(long, env = "GITLAB_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// OAuth application secret, for confidential applications
    #[arg(long, env = "GITLAB_OAUTH_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Registered redirect URI; omit to use a temporary loopback listener
    #[arg(long, env = "GITLAB_OAUTH_REDIRECT_URI")]
    redirect_uri: Option<String>,
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Authorize in the browser (PKCE) and write a token file
    Login {
        #[command(flatten)]
        client: OAuthClientArgs,

        /// OAuth application id
        #[arg(long, env = "GITLAB_OAUTH_CLIENT_ID")]
        client_id: String,

        /// Space or comma separated scopes
        #[arg(long, default_value = "read_api")]
        scopes: String,

        /// Where to write the token file
        #[arg(long, env = "GITLAB_OAUTH_TOKEN_FILE")]
        out: Option<PathBuf>,
    },
    /// Refresh an existing token file
    Refresh {
        #[command(flatten)]
        client: OAuthClientArgs,

        /// OAuth application id (defaults to the one stored in the file)
        #[arg(long, env = "GITLAB_OAUTH_CLIENT_ID")]
        client_id: Option<String>,

        /// Token file to refresh
        #[arg(long, env = "GITLAB_OAUTH_TOKEN_FILE")]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Stdio { debug, token } => run_stdio_server(debug, token).await,
        Commands::Http {
            address,
            debug,
            stateless,
        } => run_http_server(address, debug, stateless).await,
        Commands::Auth { command } => run_auth(command).await,
    }
}

/// Logs go to stderr; stdout carries JSON-RPC in stdio mode
///
/// `RUST_LOG` wins, then `LOG_LEVEL`; `--debug` forces debug.
fn init_tracing(debug: bool, log_level: Option<&str>) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level.unwrap_or("info")))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();
}

fn load_config(overrides: Vec<(String, String)>) -> Result<Config> {
    let vars = std::env::vars().chain(overrides);
    Config::from_vars(vars).context("Invalid configuration")
}

fn build_tools(config: &Config) -> Result<GitLabTools> {
    let http = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .build()
        .context("Failed to build HTTP client")?;
    let auth = match config.auth_mode {
        AuthMode::Pat => {
            AuthProvider::personal_access_token(config.token.clone().context("GITLAB_TOKEN is required")?)
        }
        AuthMode::OAuth => AuthProvider::oauth(config.oauth_settings(), http.clone()),
    };
    let client = GitlabClient::with_http(config.client_options(), auth, http);
    Ok(GitLabTools::new(client, config.policy()))
}

async fn run_stdio_server(debug: bool, token: Option<String>) -> Result<()> {
    let overrides = token
        .map(|t| vec![("GITLAB_TOKEN".to_string(), t)])
        .unwrap_or_default();
    let config = load_config(overrides)?;
    init_tracing(debug, config.log_level.as_deref());

    tracing::info!(
        host = %config.host,
        auth_mode = %config.auth_mode,
        read_only = config.read_only,
        "Starting GitLab MCP server in STDIN/STDOUT mode"
    );

    let tools = build_tools(&config)?;
    gitlab_mcp::transport::stdio::run_stdio_server(tools)
        .await
        .map_err(|e| anyhow::anyhow!("Error running STDIO server: {}", e))
}

async fn run_http_server(address: Option<SocketAddr>, debug: bool, stateless: bool) -> Result<()> {
    let mut overrides = Vec::new();
    if let Some(addr) = address {
        overrides.push(("GITLAB_MCP_HTTP_HOST".to_string(), addr.ip().to_string()));
        overrides.push(("GITLAB_MCP_HTTP_PORT".to_string(), addr.port().to_string()));
    }
    if stateless {
        overrides.push(("GITLAB_MCP_HTTP_STATEFUL".to_string(), "false".to_string()));
    }
    let config = load_config(overrides)?;
    init_tracing(debug, config.log_level.as_deref());

    let addr = config.http.bind_address()?;
    tracing::info!(
        host = %config.host,
        auth_mode = %config.auth_mode,
        read_only = config.read_only,
        "Starting GitLab MCP server in HTTP mode"
    );

    let tools = build_tools(&config)?;
    gitlab_mcp::transport::http::serve(tools, config.http.clone(), addr).await
}

async fn run_auth(command: AuthCommands) -> Result<()> {
    init_tracing(false, std::env::var("LOG_LEVEL").ok().as_deref());
    let http = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;

    match command {
        AuthCommands::Login {
            client,
            client_id,
            scopes,
            out,
        } => {
            let request = LoginRequest {
                host: client.host.trim_end_matches('/').to_string(),
                client_id,
                client_secret: client.client_secret,
                redirect_uri: client.redirect_uri,
                scopes,
                out: out.unwrap_or_else(default_token_path),
                timeout: DEFAULT_CALLBACK_TIMEOUT,
            };
            let token = login(&http, &request, &mut TerminalPrompt).await?;
            println!("Saved OAuth token to {}", request.out.display());
            if let Some(expires_at) = token.computed_expires_at() {
                println!("Access token expires at {} (unix seconds)", expires_at);
            }
        }
        AuthCommands::Refresh {
            client,
            client_id,
            file,
        } => {
            let request = RefreshRequest {
                host: client.host.trim_end_matches('/').to_string(),
                client_id,
                client_secret: client.client_secret,
                redirect_uri: client.redirect_uri,
                file: file.unwrap_or_else(default_token_path),
            };
            refresh_token_file(&http, &request).await?;
            println!("Refreshed OAuth token in {}", request.file.display());
        }
    }
    Ok(())
}
