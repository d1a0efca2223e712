//! Error types for credential loading and authorization.

use std::path::PathBuf;
use std::time::Duration;

/// Problems with the static app credential file. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Unable to read app credential file: {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to parse app credentials: {0}")]
    Malformed(String),
}

/// Failures while obtaining or using an access token.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Unable to retrieve token from web: {0}")]
    WebFlowFailed(String),

    #[error("Unable to cache oauth token: {0}")]
    CacheWriteFailed(String),

    #[error("Unable to start local callback listener: {0}")]
    Listener(#[from] std::io::Error),

    #[error("Timed out after {}s waiting for the authorization callback", .0.as_secs())]
    CallbackTimeout(Duration),

    #[error("Unable to refresh oauth token: {0}")]
    Refresh(String),
}
