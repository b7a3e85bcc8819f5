//! GitLab MCP server
//!
//! Model Context Protocol tools for GitLab: projects, issues, merge
//! requests, repository files, pipelines, job logs and artifacts.
//!
//! ## Layout
//!
//! - [`gitlab`]: the access layer. Credentials (personal access token or
//!   OAuth with single-flight refresh), retries with backoff, bounded log
//!   tails and artifact downloads, and [`gitlab::GitlabClient`] with one
//!   method per operation.
//! - [`tools`]: the MCP tool surface built on rmcp.
//! - [`policy`]: read-only mode, tool allow/deny lists and the per-project
//!   write allowlist.
//! - [`transport`]: stdio, and HTTP with stateful or stateless sessions.
//! - [`config`]: environment configuration.
//!
//! ## Authentication
//!
//! ```bash
//! # Personal access token (default)
//! export GITLAB_TOKEN=glpat-...
//!
//! # OAuth with a refreshable token file
//! export GITLAB_AUTH_MODE=oauth
//! export GITLAB_OAUTH_TOKEN_FILE=~/.config/gitlab-mcp/oauth-token.json
//! gitlab-mcp auth login --client-id <application id>
//! ```

pub mod config;
pub mod gitlab;
pub mod policy;
pub mod tools;
pub mod transport;
