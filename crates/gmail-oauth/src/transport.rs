use tokio::sync::Mutex;

use crate::credentials::AppCredentials;
use crate::error::AuthError;
use crate::token::{self, CachedToken};

/// Client registration needed to trade a refresh token for a new access token.
#[derive(Debug, Clone)]
struct Refresher {
    token_uri: String,
    client_id: String,
    client_secret: String,
}

/// HTTP client that attaches a bearer token to outgoing requests.
///
/// Expired tokens are refreshed in memory, right before use, when a refresh
/// token is available. The refreshed token is not written back to the cache
/// file. Without a refresh token the stale token is sent as-is and the server
/// decides.
#[derive(Debug)]
pub struct AuthenticatedTransport {
    http: reqwest::Client,
    token: Mutex<CachedToken>,
    refresher: Option<Refresher>,
}

impl AuthenticatedTransport {
    /// Create a transport that always sends `token`.
    pub fn new(http: reqwest::Client, token: CachedToken) -> Self {
        Self {
            http,
            token: Mutex::new(token),
            refresher: None,
        }
    }

    /// Allow refreshing through the token endpoint in `credentials`.
    pub fn with_refresh(mut self, credentials: &AppCredentials) -> Self {
        self.refresher = Some(Refresher {
            token_uri: credentials.token_uri.clone(),
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
        });
        self
    }

    /// Snapshot of the token currently in use.
    pub async fn token(&self) -> CachedToken {
        self.token.lock().await.clone()
    }

    /// Start an authorized GET request.
    pub async fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, AuthError> {
        self.authorize(self.http.get(url)).await
    }

    /// Attach `Authorization: Bearer …` to `request`.
    pub async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, AuthError> {
        let access_token = self.access_token().await?;
        Ok(request.bearer_auth(access_token))
    }

    async fn access_token(&self) -> Result<String, AuthError> {
        let mut current = self.token.lock().await;

        let (Some(refresher), Some(refresh_token)) = (&self.refresher, &current.refresh_token)
        else {
            return Ok(current.access_token.clone());
        };
        if !current.is_expired() {
            return Ok(current.access_token.clone());
        }

        tracing::info!("access token expired, refreshing");

        let mut refreshed = token::request_token(
            &self.http,
            &refresher.token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", refresher.client_id.as_str()),
                ("client_secret", refresher.client_secret.as_str()),
            ],
        )
        .await
        .map_err(AuthError::Refresh)?;

        // Keep the existing refresh token when the server does not rotate it
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = current.refresh_token.clone();
        }

        *current = refreshed;
        Ok(current.access_token.clone())
    }
}
