use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::credentials::AppCredentials;
use crate::error::{AuthError, CredentialError};
use crate::flow;
use crate::launcher::Launcher;
use crate::token::CachedToken;
use crate::transport::AuthenticatedTransport;

/// Produces authenticated transports, from the token cache when possible and
/// through the interactive browser flow otherwise.
pub struct CredentialClient {
    credentials: AppCredentials,
    token_cache_file: PathBuf,
    launcher: Arc<dyn Launcher>,
    http: reqwest::Client,
    callback_timeout: Option<Duration>,
}

impl CredentialClient {
    /// Load the app credentials. The token cache is not touched until a
    /// transport is requested.
    pub fn new(
        app_credential_file: impl AsRef<Path>,
        token_cache_file: impl Into<PathBuf>,
        launcher: Arc<dyn Launcher>,
    ) -> Result<Self, CredentialError> {
        let credentials = AppCredentials::load(app_credential_file)?;

        Ok(Self {
            credentials,
            token_cache_file: token_cache_file.into(),
            launcher,
            http: reqwest::Client::new(),
            callback_timeout: None,
        })
    }

    /// Give up waiting for the browser callback after `timeout`.
    pub fn with_callback_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Use `http` for token requests and for the returned transports.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn credentials(&self) -> &AppCredentials {
        &self.credentials
    }

    /// Return a transport for the cached token, or run the web flow and cache
    /// its result when there is no usable cached token.
    pub async fn acquire_transport(
        &self,
        out: &mut (dyn Write + Send),
    ) -> Result<AuthenticatedTransport, AuthError> {
        let token = match self.cached_token() {
            Some(token) => token,
            None => self.authorize(out).await?,
        };

        Ok(AuthenticatedTransport::new(self.http.clone(), token).with_refresh(&self.credentials))
    }

    /// Run the web flow unconditionally and overwrite the token cache.
    pub async fn authorize(&self, out: &mut (dyn Write + Send)) -> Result<CachedToken, AuthError> {
        let token = flow::run_web_flow(
            &self.http,
            &self.credentials,
            self.launcher.as_ref(),
            out,
            self.callback_timeout,
        )
        .await?;

        token
            .save(&self.token_cache_file)
            .map_err(|e| AuthError::CacheWriteFailed(e.to_string()))?;
        tracing::debug!(path = %self.token_cache_file.display(), "cached OAuth token");

        Ok(token)
    }

    fn cached_token(&self) -> Option<CachedToken> {
        match CachedToken::load(&self.token_cache_file) {
            Ok(token) => {
                tracing::debug!(path = %self.token_cache_file.display(), "using cached OAuth token");
                Some(token)
            }
            Err(e) => {
                tracing::debug!(
                    path = %self.token_cache_file.display(),
                    error = %e,
                    "no usable cached token"
                );
                None
            }
        }
    }
}
