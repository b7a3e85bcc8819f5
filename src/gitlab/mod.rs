//! GitLab access layer
//!
//! Credentials, retries, bounded streaming and the per-operation facade.

pub mod auth;
pub mod client;
pub mod errors;
pub mod retry;
pub mod streaming;

pub use auth::{AuthMode, AuthProvider, OAuthSettings};
pub use client::{ClientOptions, DefaultBranchCache, GitlabClient};
pub use errors::{AuthError, GitlabError, GitlabResult, PublicError, to_public_error};
pub use retry::RetryPolicy;
